pub mod attrs;
pub mod paging;
pub mod shortcode;
pub mod upsert;

pub use attrs::*;
pub use paging::*;
pub use shortcode::{decode, encode, ShortCodeError, SHORT_CODE_PADDING};
pub use upsert::*;
