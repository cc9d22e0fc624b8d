pub mod chrome;
pub mod driver;
pub mod error;

pub use chrome::CdpDriver;
pub use driver::{CookieRecord, ElementRef, PageDriver};
pub use error::{CdpError, Result};
