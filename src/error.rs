use image::ImageError;

/// Main error type for the library.
#[derive(Debug)]
pub enum Fuse3dError {
    /// Used when the user pass a logical invalid parameter to a function.
    InvalidParameter(String),
    Io(std::io::Error),
    /// Malformed text input, carries `file:line: message`.
    Parser(String),
    Image(ImageError),
}

pub type Result<T> = std::result::Result<T, Fuse3dError>;

impl std::fmt::Display for Fuse3dError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Fuse3dError::Io(err) => write!(f, "IO error: {err}"),
            Fuse3dError::Parser(err) => write!(f, "Parser error: {err}"),
            Fuse3dError::InvalidParameter(err) => write!(f, "Parameter error: {err}"),
            Fuse3dError::Image(err) => write!(f, "Image error: {err}"),
        }
    }
}

impl Fuse3dError {
    /// Create a error with the kind `InvalidParameter`.
    /// # Arguments
    /// * `msg` - The error message.
    pub fn invalid_parameter<T: ToString>(msg: T) -> Self {
        Fuse3dError::InvalidParameter(msg.to_string())
    }
}

impl std::error::Error for Fuse3dError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Fuse3dError::Io(err) => Some(err),
            Fuse3dError::Image(err) => Some(err),
            Fuse3dError::Parser(_) => None,
            Fuse3dError::InvalidParameter(_) => None,
        }
    }
}

impl From<std::io::Error> for Fuse3dError {
    fn from(err: std::io::Error) -> Self {
        Fuse3dError::Io(err)
    }
}

impl From<ImageError> for Fuse3dError {
    fn from(err: ImageError) -> Self {
        Fuse3dError::Image(err)
    }
}

impl From<serde_json::Error> for Fuse3dError {
    fn from(err: serde_json::Error) -> Self {
        Fuse3dError::Parser(err.to_string())
    }
}
