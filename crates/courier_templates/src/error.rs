use courier_common::error::RemoteError;
use thiserror::Error;

/// Everything that can abort a render.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RenderError {
    /// Fetching the template or its strings failed.
    #[error(transparent)]
    Remote(#[from] RemoteError),
    /// The name is not of the form `<component>/<template>`.
    #[error("invalid template name {0:?}, expected <component>/<template>")]
    InvalidTemplateName(String),
    /// A `{`-prefixed string argument was not valid JSON.
    #[error("malformed string argument {param:?}: {reason}")]
    StringArgument {
        /// The argument text after expansion.
        param: String,
        /// What the JSON parser complained about.
        reason: String,
    },
    /// The template source does not parse.
    #[error("template syntax error at byte {position}: {message}")]
    Syntax {
        /// Byte offset into the template source.
        position: usize,
        /// What is wrong there.
        message: String,
    },
}
