pub mod parser;
pub mod query;
pub mod view;

pub use parser::{ParsedRequest, ParsedViews, RequestParser};
pub use view::{Projection, ResourceView, ViewRole, WritePayload};
