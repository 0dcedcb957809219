use thiserror::Error;

/// Result type for decompiler operations
pub type Result<T> = std::result::Result<T, DecompileError>;

/// Error types for classfile parsing and decompilation
#[derive(Error, Debug)]
pub enum DecompileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Malformed class file: {message}")]
    MalformedClassFile { message: String },

    #[error("Malformed constant at index {index}: {message}")]
    MalformedConstant { index: u16, message: String },

    #[error("Reconstruction mismatch at offset {offset}: {message}")]
    ReconstructionMismatch { offset: u32, message: String },

    #[error("Structuring stalled after {passes} passes ({live_blocks} blocks left)")]
    StructuringStalled { passes: usize, live_blocks: usize },

    #[error("Class not found: {name}")]
    ClassNotFound { name: String },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl DecompileError {
    /// Create a malformed class file error
    pub fn malformed_class(message: impl Into<String>) -> Self {
        Self::MalformedClassFile {
            message: message.into(),
        }
    }

    /// Create a constant pool resolution error
    pub fn malformed_constant(index: u16, message: impl Into<String>) -> Self {
        Self::MalformedConstant {
            index,
            message: message.into(),
        }
    }

    /// Create a soft reconstruction error
    pub fn mismatch(offset: u32, message: impl Into<String>) -> Self {
        Self::ReconstructionMismatch {
            offset,
            message: message.into(),
        }
    }

    /// Hard errors abort the current unit; soft ones only degrade a method.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::ReconstructionMismatch { .. } | Self::StructuringStalled { .. }
        )
    }
}

impl From<binrw::Error> for DecompileError {
    fn from(err: binrw::Error) -> Self {
        Self::malformed_class(err.to_string())
    }
}
