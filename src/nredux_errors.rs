use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReductionError {
    #[error("Unable to perform file operation: {0}")]
    IoError(#[from] std::io::Error),

    #[error("UTF-8 Path error: {0}")]
    Utf8PathError(String),

    #[error("Invalid ROI specification: {0}")]
    InvalidRoiSpecification(String),

    #[error("{0} is not linked to a valid result creator")]
    UnknownResultKind(String),

    #[error("The fit backend '{0}' is not recognized")]
    UnknownFitBackend(String),

    #[error("The reduction job '{0}' is not recognized")]
    UnknownJob(String),

    #[error("Missing argument '{argument}' for result kind '{kind}'")]
    MissingResultArgument { kind: String, argument: String },

    #[error("Channel index {index} out of range for {len} channels")]
    ChannelIndexOutOfRange { index: usize, len: usize },

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Payload of {found} elements cannot be shaped into {expected:?}")]
    ShapeMismatch { expected: Vec<usize>, found: usize },

    #[error("Error during the ASCII table parsing: {0}")]
    TableParseError(String),

    #[error("No scan column names found in the metadata of {0}")]
    MissingScanColumns(String),

    #[error("Invalid configuration parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid loader mode: {0}")]
    InvalidLoaderMode(String),

    #[error("Gaussian noise generation failed: {0:?}")]
    NoiseInjectionError(rand_distr::NormalError),

    #[error("No bootstrap candidate produced a finite contrast")]
    NoValidBootstrapCandidate,

    #[error("Unable to read metadata alias file: {0}")]
    AliasFileError(#[from] serde_json::Error),

    #[error("Error during the nom parsing: {0}")]
    NomParsingError(String),
}

impl From<rand_distr::NormalError> for ReductionError {
    fn from(err: rand_distr::NormalError) -> Self {
        ReductionError::NoiseInjectionError(err)
    }
}

impl PartialEq for ReductionError {
    fn eq(&self, other: &Self) -> bool {
        use ReductionError::*;
        match (self, other) {
            // payloads without a meaningful equality: same variant is enough
            (IoError(_), IoError(_)) => true,
            (AliasFileError(_), AliasFileError(_)) => true,

            (Utf8PathError(a), Utf8PathError(b)) => a == b,
            (InvalidRoiSpecification(a), InvalidRoiSpecification(b)) => a == b,
            (UnknownResultKind(a), UnknownResultKind(b)) => a == b,
            (UnknownFitBackend(a), UnknownFitBackend(b)) => a == b,
            (UnknownJob(a), UnknownJob(b)) => a == b,
            (
                MissingResultArgument {
                    kind: k1,
                    argument: a1,
                },
                MissingResultArgument {
                    kind: k2,
                    argument: a2,
                },
            ) => k1 == k2 && a1 == a2,
            (
                ChannelIndexOutOfRange { index: i1, len: l1 },
                ChannelIndexOutOfRange { index: i2, len: l2 },
            ) => i1 == i2 && l1 == l2,
            (NotImplemented(a), NotImplemented(b)) => a == b,
            (
                ShapeMismatch {
                    expected: e1,
                    found: f1,
                },
                ShapeMismatch {
                    expected: e2,
                    found: f2,
                },
            ) => e1 == e2 && f1 == f2,
            (TableParseError(a), TableParseError(b)) => a == b,
            (MissingScanColumns(a), MissingScanColumns(b)) => a == b,
            (InvalidParameter(a), InvalidParameter(b)) => a == b,
            (InvalidLoaderMode(a), InvalidLoaderMode(b)) => a == b,
            (NoiseInjectionError(a), NoiseInjectionError(b)) => a == b,
            (NomParsingError(a), NomParsingError(b)) => a == b,

            (NoValidBootstrapCandidate, NoValidBootstrapCandidate) => true,

            _ => false,
        }
    }
}
