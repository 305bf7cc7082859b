use aws_config::meta::region::RegionProviderChain;
use aws_sdk_cloudformation::model::Parameter;
use aws_sdk_cloudformation::output::CreateStackOutput;
use aws_types::region::Region;
use chrono::{DateTime, TimeZone};
use log::{debug, info};

pub const DEFAULT_STACK_PREFIX: &str = "testing";

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("Service error ocurred: {0}.")]
    ServiceError(String),

    #[error("Unknown error ocurred: {0}.")]
    UnknownError(String),

    #[error("Stack not found: {0}")]
    NotFoundError(String),

    #[error("No AWS region configured")]
    MissingRegion,

    #[error("Invalid stack parameter `{0}`, expected KEY=VALUE")]
    InvalidParameter(String),
}

/// Options passed through to `CreateStack` untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateOptions {
    pub disable_rollback: bool,
    pub parameters: Vec<(String, String)>,
    pub timeout_in_minutes: Option<i32>,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            disable_rollback: true,
            parameters: Vec::new(),
            timeout_in_minutes: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedStack {
    pub stack_id: String,
    pub status: String,
}

pub struct Stack {
    pub stack_name: String,

    client: aws_sdk_cloudformation::Client,
}

impl Stack {
    pub async fn new(stack_name: String, region: Option<String>) -> Result<Self, Error> {
        let region = match region {
            Some(provided_region) => Region::new(provided_region),
            None => RegionProviderChain::default_provider()
                .region()
                .await
                .ok_or(Error::MissingRegion)?,
        };
        debug!("Using region {} for stack {}", region, stack_name);

        let sdk_config = aws_config::from_env().region(region).load().await;
        let client = aws_sdk_cloudformation::Client::new(&sdk_config);

        return Ok(Self { stack_name, client });
    }

    /// Submits the template body and returns the new stack id.
    pub async fn create(&self, template_body: &str, options: &CreateOptions) -> Result<String, Error> {
        let parameters: Vec<Parameter> = options
            .parameters
            .iter()
            .map(|(key, value)| {
                Parameter::builder()
                    .parameter_key(key)
                    .parameter_value(value)
                    .build()
            })
            .collect();

        info!("Creating stack {}", self.stack_name);
        let result = self
            .client
            .create_stack()
            .stack_name(&self.stack_name)
            .template_body(template_body)
            .disable_rollback(options.disable_rollback)
            .set_parameters(Some(parameters))
            .set_timeout_in_minutes(options.timeout_in_minutes)
            .send()
            .await;

        let result = match result {
            Ok(data) => data,
            Err(aws_sdk_cloudformation::types::SdkError::ServiceError { err, .. }) => {
                return Err(Error::ServiceError(err.to_string()));
            }
            Err(err) => return Err(Error::UnknownError(err.to_string())),
        };

        return stack_id_from(&result);
    }

    pub async fn status(&self) -> Result<String, Error> {
        let result = self
            .client
            .describe_stacks()
            .stack_name(&self.stack_name)
            .send()
            .await;

        let result = match result {
            Ok(data) => data,
            Err(aws_sdk_cloudformation::types::SdkError::ServiceError { err, .. }) => {
                return Err(Error::ServiceError(err.to_string()));
            }
            Err(err) => return Err(Error::UnknownError(err.to_string())),
        };

        let stack = match result.stacks().unwrap_or_default().first() {
            Some(stack) => stack,
            None => return Err(Error::NotFoundError(self.stack_name.clone())),
        };

        let status = stack
            .stack_status()
            .map(|status| status.as_str().to_string())
            .unwrap_or_default();
        return Ok(status);
    }

    pub async fn provision(
        &self,
        template_body: &str,
        options: &CreateOptions,
    ) -> Result<CreatedStack, Error> {
        let stack_id = self.create(template_body, options).await?;
        let status = self.status().await?;
        info!("Stack {} is {}", stack_id, status);

        return Ok(CreatedStack { stack_id, status });
    }
}

fn stack_id_from(output: &CreateStackOutput) -> Result<String, Error> {
    match output.stack_id() {
        Some(stack_id) => Ok(stack_id.to_string()),
        None => Err(Error::UnknownError(format!(
            "CreateStack returned no stack id: {:?}",
            output
        ))),
    }
}

/// `testing201610171854` style name: prefix plus a minute resolution timestamp.
pub fn timestamped_stack_name<Tz: TimeZone>(prefix: &str, now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("{}{}", prefix, now.format("%Y%m%d%H%M"))
}

pub fn parse_parameter(raw: &str) -> Result<(String, String), Error> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(Error::InvalidParameter(raw.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use aws_sdk_cloudformation::output::CreateStackOutput;

    use super::{parse_parameter, stack_id_from, timestamped_stack_name, CreateOptions, Error};

    #[test]
    fn stack_name_carries_timestamp() {
        let now = Utc.with_ymd_and_hms(2016, 10, 17, 18, 54, 3).unwrap();
        assert_eq!(
            "testing201610171854",
            timestamped_stack_name("testing", &now)
        );
    }

    #[test]
    fn parses_key_value_parameters() {
        assert_eq!(
            Ok((String::from("KeyName"), String::from("deploy=key"))),
            parse_parameter("KeyName=deploy=key")
        );
        assert_eq!(
            Ok((String::from("Empty"), String::new())),
            parse_parameter("Empty=")
        );
    }

    #[test]
    fn rejects_malformed_parameters() {
        assert_eq!(
            Err(Error::InvalidParameter(String::from("KeyName"))),
            parse_parameter("KeyName")
        );
        assert_eq!(
            Err(Error::InvalidParameter(String::from("=value"))),
            parse_parameter("=value")
        );
    }

    #[test]
    fn missing_stack_id_is_an_error() {
        let output = CreateStackOutput::builder().build();
        match stack_id_from(&output) {
            Err(Error::UnknownError(_)) => {}
            _ => panic!("Expected `UnknownError` error"),
        }

        let output = CreateStackOutput::builder()
            .stack_id("arn:aws:cloudformation:eu-west-1:123456789012:stack/testing/1")
            .build();
        assert_eq!(
            Ok(String::from(
                "arn:aws:cloudformation:eu-west-1:123456789012:stack/testing/1"
            )),
            stack_id_from(&output)
        );
    }

    #[test]
    fn rollback_is_disabled_by_default() {
        assert_eq!(true, CreateOptions::default().disable_rollback);
    }
}
