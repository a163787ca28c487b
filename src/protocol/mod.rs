//! Wire format: whitespace-delimited command tokens in, length-prefixed binary frames out.

pub mod command;
pub mod framing;
pub mod token;

pub use command::{CameraPose, Command};
pub use framing::{FrameHeader, HEADER_LEN, RenderResponse, read_response, write_response};
pub use token::TokenReader;
