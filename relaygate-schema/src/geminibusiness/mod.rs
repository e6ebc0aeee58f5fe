//! Gemini-Business reverse-session wire schema: widget endpoint bodies and
//! the per-request JWT shapes used to authenticate them.

mod jwt;
mod widget;

pub use jwt::{JwtHeader, JwtPayload, XsrfTokenResponse};
pub use widget::{
    WidgetAddContextFileRequest, WidgetAddContextFileResponse, WidgetCreateSessionRequest,
    WidgetCreateSessionResponse, WidgetListSessionFileMetadataRequest,
    WidgetListSessionFileMetadataResponse, WidgetSessionFileMetadata, WidgetStreamAssistRequest,
};
