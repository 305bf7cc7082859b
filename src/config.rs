use log::debug;
use serde::{Deserialize, Serialize};
use std::{fs, io, path::PathBuf};
use validator::{Validate, ValidationError};

use crate::generate::{InstanceParameters, DEFAULT_IMAGE_PARAMETER, DEFAULT_SIZE_PARAMETER};

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("File {0} not found")]
    FileNotFound(String),

    #[error("Parsing error: {0}")]
    ParsingError(String),

    #[error("Validation errors: {0}")]
    ValidationError(String),

    #[error("Unknown error occurred: {0}")]
    Unknown(String),
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ConfigFile {
    pub location: PathBuf,
}

/// One multi-instance template to generate.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ConfigEntry {
    #[validate(length(min = 1))]
    pub instance_names: Vec<String>,

    pub image_parameter: Option<String>,

    pub size_parameter: Option<String>,

    #[validate(custom = "validate_template_file")]
    pub output: ConfigFile,

    pub stack_name: Option<String>,

    pub region: Option<String>,
}

impl ConfigEntry {
    pub fn instance_parameters(&self) -> InstanceParameters {
        InstanceParameters {
            image: self
                .image_parameter
                .clone()
                .unwrap_or_else(|| String::from(DEFAULT_IMAGE_PARAMETER)),
            size: self
                .size_parameter
                .clone()
                .unwrap_or_else(|| String::from(DEFAULT_SIZE_PARAMETER)),
        }
    }
}

pub type Config = Vec<ConfigEntry>;

pub fn parse(path: &PathBuf) -> Result<Config, Error> {
    let contents = fs::read_to_string(path).map_err(|error| match error.kind() {
        io::ErrorKind::NotFound => Error::FileNotFound(path.display().to_string()),
        _ => Error::Unknown(error.to_string()),
    })?;

    let config: Config = serde_yaml::from_str(&contents)
        .map_err(|error| Error::ParsingError(error.to_string()))?;

    config
        .iter()
        .try_for_each(|config_entry| config_entry.validate())
        .map_err(|error| Error::ValidationError(error.to_string()))?;
    debug!("Loaded {} entries from {}", config.len(), path.display());

    return Ok(config);
}

fn validate_template_file(template_file: &ConfigFile) -> Result<(), ValidationError> {
    let file_extension = match template_file.location.extension() {
        Some(extension) => extension,
        None => {
            return Err(ValidationError::new(
                "Unable to parse the extension of the template file location",
            ))
        }
    };
    if file_extension != "json" && file_extension != "yaml" && file_extension != "yml" {
        return Err(ValidationError::new(
            "The template file location has to end with `.json`, `.yaml` or `.yml`",
        ));
    }

    return Ok(());
}
