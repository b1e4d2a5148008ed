pub mod candidate;
pub mod codec;
pub mod error;
pub mod estimator;
pub mod reporter;
pub mod scheduler;

pub use candidate::{
    is_supported_image, validate_selection, webp_output_path, Candidate, CandidateStatus,
    CollisionPolicy, OutputPlan, OutputPlanner, DEFAULT_MAX_FILES, SUPPORTED_EXTENSIONS,
};
pub use codec::{convert_to_file, WebpCodec, WebpEncode};
pub use error::{ConvertError, Result};
pub use estimator::{estimate, reduction_percent, EstimationRecord, EstimationStatus};
pub use reporter::{
    BatchSummary, ConvertedFile, FailureRecord, JobOutcome, ProgressSnapshot, Reporter, Summary,
};
pub use scheduler::{BatchHandle, ConversionJob, Scheduler, SchedulerOptions};
