#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("patient not found: {0}")]
    PatientNotFound(String),
    #[error("insurance plan catalog is empty")]
    EmptyCatalog,
    #[error("patient consent required for analysis")]
    ConsentRequired,
    #[error("duplicate insurance plan id: {0}")]
    DuplicatePlan(String),
    #[error("store lock poisoned: {0}")]
    StorePoisoned(&'static str),

    #[error("failed to read file: {0}")]
    FileRead(std::io::Error),
    #[error("failed to deserialize YAML at {path}: {source}")]
    YamlDeserialization {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("FHIR error: {0}")]
    Fhir(#[from] fhir::FhirError),
    #[error("invalid text: {0}")]
    Text(#[from] carescore_types::TextError),
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
