//! Error types for the block editor.
//!
//! Every user-facing failure maps to a [`Notice`] that is handed to the
//! notification collaborator. Failures that are recovered locally (image
//! decode/encode) never reach the caller as errors.

use miette::Diagnostic;
use smol_str::SmolStr;

use crate::platform::PlatformError;
use crate::types::BlockId;

/// Main error type for editor operations.
#[derive(thiserror::Error, Debug, Diagnostic)]
pub enum EditorError {
    /// The supplied video link matched none of the known provider shapes.
    #[error("unsupported video link: {input}")]
    #[diagnostic(
        code(folio::video::unsupported),
        help("paste a YouTube or Vimeo link, or an embed snippet with a src attribute")
    )]
    UnsupportedVideoFormat { input: String },

    /// The file exceeds the size cap of the flow it was submitted to.
    #[error("file is {size} bytes, limit is {limit} bytes")]
    #[diagnostic(code(folio::ingest::too_large))]
    FileTooLarge { size: u64, limit: u64 },

    /// The file extension (or content) is not accepted by the flow.
    #[error("file type `{extension}` is not allowed")]
    #[diagnostic(code(folio::ingest::file_type))]
    DisallowedFileType { extension: SmolStr },

    /// Padding was requested for a block narrower than the threshold.
    #[error("block {block} is {width}px wide, padding needs at least {min}px")]
    #[diagnostic(
        code(folio::padding::not_eligible),
        help("padding is only available for wide media")
    )]
    PaddingNotEligible {
        block: BlockId,
        width: u32,
        min: u32,
    },

    /// The reorder view was requested on a document with no blocks.
    #[error("document has no content to reorder")]
    #[diagnostic(code(folio::reorder::empty))]
    EmptyDocumentOnReorder,

    /// The reorder view is not open.
    #[error("reorder view is not open")]
    #[diagnostic(code(folio::reorder::closed))]
    ReorderNotOpen,

    /// A reorder was confirmed while an ingestion still owns one of the blocks.
    #[error("block {0} is still being ingested")]
    #[diagnostic(code(folio::reorder::busy))]
    ReorderBusy(BlockId),

    /// A block id was referenced that the surface does not contain.
    #[error("unknown block {0}")]
    #[diagnostic(code(folio::blocks::unknown))]
    UnknownBlock(BlockId),

    /// Image decode or encode failed. Recovered by embedding the original.
    #[error("image could not be processed: {0}")]
    #[diagnostic(code(folio::ingest::decode))]
    IngestionDecodeFailure(String),

    /// A collaborator (surface, uploader, host) failed.
    #[error(transparent)]
    Platform(#[from] PlatformError),

    /// Persisted content could not be read or written.
    #[error(transparent)]
    #[diagnostic(code(folio::persist))]
    Persistence(#[from] serde_json::Error),
}

impl EditorError {
    /// The user-visible notice for this error, if it should be surfaced.
    pub fn notice(&self) -> Option<Notice> {
        match self {
            EditorError::UnsupportedVideoFormat { .. } => Some(Notice::UnsupportedVideo),
            EditorError::FileTooLarge { limit, .. } => Some(Notice::FileTooLarge { limit: *limit }),
            EditorError::DisallowedFileType { extension } => Some(Notice::DisallowedFileType {
                extension: extension.clone(),
            }),
            EditorError::PaddingNotEligible { min, .. } => Some(Notice::MinimumWidth { min: *min }),
            EditorError::EmptyDocumentOnReorder => Some(Notice::NothingToReorder),
            EditorError::ReorderBusy(_) => Some(Notice::StillUploading),
            EditorError::IngestionDecodeFailure(_) => None,
            EditorError::ReorderNotOpen
            | EditorError::UnknownBlock(_)
            | EditorError::Platform(_)
            | EditorError::Persistence(_) => None,
        }
    }
}

/// A transient message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    UnsupportedVideo,
    FileTooLarge { limit: u64 },
    DisallowedFileType { extension: SmolStr },
    MinimumWidth { min: u32 },
    NothingToReorder,
    StillUploading,
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Notice::UnsupportedVideo => {
                write!(f, "Unsupported video link. Please use a YouTube or Vimeo URL.")
            }
            Notice::FileTooLarge { limit } => {
                write!(f, "Images larger than {}MB can't be added.", limit / (1024 * 1024))
            }
            Notice::DisallowedFileType { extension } => {
                write!(f, "`.{}` files can't be added.", extension)
            }
            Notice::MinimumWidth { min } => {
                write!(f, "This option is only available for content at least {}px wide.", min)
            }
            Notice::NothingToReorder => write!(f, "There is no content yet."),
            Notice::StillUploading => write!(f, "Please wait for the image to finish processing."),
        }
    }
}

pub type Result<T, E = EditorError> = std::result::Result<T, E>;
