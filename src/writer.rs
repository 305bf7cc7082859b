use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use log::info;

use crate::template::{self, Template};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Unable to write {0}: {1}")]
    WriteError(String, io::Error),

    #[error("Unsupported template file extension: {0}")]
    UnsupportedExtension(String),

    #[error(transparent)]
    TemplateError(#[from] template::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum Format {
    Json,
    Yaml,
}

impl Format {
    /// Picks the format from a `.json`, `.yaml` or `.yml` extension.
    pub fn from_path(path: &Path) -> Result<Self, Error> {
        match path.extension().and_then(|extension| extension.to_str()) {
            Some("json") => Ok(Format::Json),
            Some("yaml") | Some("yml") => Ok(Format::Yaml),
            _ => Err(Error::UnsupportedExtension(path.display().to_string())),
        }
    }
}

pub fn render_text(template: &Template, format: Format) -> Result<String, Error> {
    let text = match format {
        Format::Json => template.to_json()?,
        Format::Yaml => template.to_yaml()?,
    };
    return Ok(text);
}

/// Writes the rendered template to `destination`, or to stdout when there is
/// none. A missing format is taken from the file extension, JSON otherwise.
pub fn write(
    template: &Template,
    destination: Option<&PathBuf>,
    format: Option<Format>,
) -> Result<(), Error> {
    let format = match (format, destination) {
        (Some(format), _) => format,
        (None, Some(path)) => Format::from_path(path)?,
        (None, None) => Format::Json,
    };
    let contents = render_text(template, format)?;

    match destination {
        Some(path) => {
            fs::write(path, contents)
                .map_err(|error| Error::WriteError(path.display().to_string(), error))?;
            info!("Template written to {}", path.display());
        }
        None => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{}", contents)
                .map_err(|error| Error::WriteError(String::from("stdout"), error))?;
        }
    }

    return Ok(());
}
