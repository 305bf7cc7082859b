use indexmap::IndexMap;
use log::debug;
use serde::Serialize;

use crate::expr::{pseudo, Value};

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("Logical name `{0}` is already used in this template")]
    DuplicateName(String),

    #[error("`{origin}` refers to `{target}`, which is not declared in this template")]
    DanglingReference { origin: String, target: String },

    #[error("Rendering error: {0}")]
    RenderError(String),
}

/// Returned by `add_parameter` and `add_resource`; points at the logical name
/// it was created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handle {
    logical_name: String,
}

impl Handle {
    pub fn name(&self) -> &str {
        &self.logical_name
    }

    pub fn reference(&self) -> Value {
        Value::Ref(self.logical_name.clone())
    }

    pub fn get_att(&self, attribute: &str) -> Value {
        Value::GetAtt {
            resource: self.logical_name.clone(),
            attribute: attribute.to_string(),
        }
    }
}

impl From<&Handle> for Value {
    fn from(handle: &Handle) -> Self {
        handle.reference()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Parameter {
    #[serde(rename = "Type")]
    pub parameter_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_pattern: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraint_description: Option<String>,
}

impl Parameter {
    pub fn new(parameter_type: &str) -> Self {
        Self {
            parameter_type: parameter_type.to_string(),
            description: None,
            default: None,
            allowed_values: Vec::new(),
            allowed_pattern: None,
            min_length: None,
            max_length: None,
            constraint_description: None,
        }
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn default(mut self, default: &str) -> Self {
        self.default = Some(default.to_string());
        self
    }

    pub fn allowed_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn allowed_pattern(mut self, pattern: &str) -> Self {
        self.allowed_pattern = Some(pattern.to_string());
        self
    }

    pub fn length(mut self, min: u32, max: u32) -> Self {
        self.min_length = Some(min);
        self.max_length = Some(max);
        self
    }

    pub fn constraint_description(mut self, description: &str) -> Self {
        self.constraint_description = Some(description.to_string());
        self
    }
}

/// Two level lookup table, e.g. instance type -> `Arch` -> `HVM64`.
pub type Mapping = IndexMap<String, IndexMap<String, Value>>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResourceSignal {
    pub timeout: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
}

/// Handed to CloudFormation untouched; the builder never interprets it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreationPolicy {
    pub resource_signal: ResourceSignal,
}

impl CreationPolicy {
    pub fn signal_timeout(timeout: &str) -> Self {
        Self {
            resource_signal: ResourceSignal {
                timeout: timeout.to_string(),
                count: None,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Resource {
    #[serde(rename = "Type")]
    pub resource_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,

    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub properties: IndexMap<String, Value>,

    #[serde(
        skip_serializing_if = "Vec::is_empty",
        serialize_with = "serialize_depends_on"
    )]
    pub depends_on: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_policy: Option<CreationPolicy>,
}

impl Resource {
    pub fn new(resource_type: &str) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            metadata: None,
            properties: IndexMap::new(),
            depends_on: Vec::new(),
            creation_policy: None,
        }
    }

    pub fn property(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(name.to_string(), value.into());
        self
    }

    pub fn depends_on(mut self, logical_name: &str) -> Self {
        self.depends_on.push(logical_name.to_string());
        self
    }

    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn creation_policy(mut self, policy: CreationPolicy) -> Self {
        self.creation_policy = Some(policy);
        self
    }

    fn values(&self) -> impl Iterator<Item = &Value> {
        self.metadata.iter().chain(self.properties.values())
    }
}

// A single dependency is written as a plain string, several as a list.
fn serialize_depends_on<S>(depends_on: &[String], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match depends_on {
        [single] => serializer.serialize_str(single),
        many => many.serialize(serializer),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Export {
    #[serde(rename = "Name")]
    pub name: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Output {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub value: Value,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub export: Option<Export>,
}

impl Output {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            description: None,
            value: value.into(),
            export: None,
        }
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn export(mut self, name: impl Into<Value>) -> Self {
        self.export = Some(Export { name: name.into() });
        self
    }
}

/// A CloudFormation template under construction.
///
/// Every group keeps insertion order so rendering the same sequence of calls
/// always produces the same document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Template {
    #[serde(
        rename = "AWSTemplateFormatVersion",
        skip_serializing_if = "Option::is_none"
    )]
    version: Option<String>,

    #[serde(rename = "Description", skip_serializing_if = "Option::is_none")]
    description: Option<String>,

    #[serde(rename = "Parameters", skip_serializing_if = "IndexMap::is_empty")]
    parameters: IndexMap<String, Parameter>,

    #[serde(rename = "Mappings", skip_serializing_if = "IndexMap::is_empty")]
    mappings: IndexMap<String, Mapping>,

    #[serde(rename = "Resources")]
    resources: IndexMap<String, Resource>,

    #[serde(rename = "Outputs", skip_serializing_if = "IndexMap::is_empty")]
    outputs: IndexMap<String, Output>,
}

impl Template {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_version(&mut self, version: &str) {
        self.version = Some(version.to_string());
    }

    pub fn set_description(&mut self, description: &str) {
        self.description = Some(description.to_string());
    }

    pub fn add_parameter(&mut self, name: &str, parameter: Parameter) -> Result<Handle, Error> {
        self.ensure_referable_name_is_free(name)?;
        debug!("Adding parameter {} ({})", name, parameter.parameter_type);

        self.parameters.insert(name.to_string(), parameter);
        return Ok(Handle {
            logical_name: name.to_string(),
        });
    }

    pub fn add_resource(&mut self, name: &str, resource: Resource) -> Result<Handle, Error> {
        self.ensure_referable_name_is_free(name)?;
        debug!("Adding resource {} ({})", name, resource.resource_type);

        self.resources.insert(name.to_string(), resource);
        return Ok(Handle {
            logical_name: name.to_string(),
        });
    }

    pub fn add_mapping(&mut self, name: &str, mapping: Mapping) -> Result<(), Error> {
        if self.mappings.contains_key(name) {
            return Err(Error::DuplicateName(name.to_string()));
        }
        debug!("Adding mapping {} with {} keys", name, mapping.len());

        self.mappings.insert(name.to_string(), mapping);
        return Ok(());
    }

    pub fn add_output(&mut self, name: &str, output: Output) -> Result<(), Error> {
        if self.outputs.contains_key(name) {
            return Err(Error::DuplicateName(name.to_string()));
        }
        debug!("Adding output {}", name);

        self.outputs.insert(name.to_string(), output);
        return Ok(());
    }

    pub fn has_output(&self, name: &str) -> bool {
        self.outputs.contains_key(name)
    }

    pub fn parameters(&self) -> impl Iterator<Item = (&str, &Parameter)> {
        self.parameters.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn resources(&self) -> impl Iterator<Item = (&str, &Resource)> {
        self.resources.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn outputs(&self) -> impl Iterator<Item = (&str, &Output)> {
        self.outputs.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Renders the template into a generic JSON document. Does not check
    /// references; see `validate_references`.
    pub fn render(&self) -> Result<serde_json::Value, Error> {
        serde_json::to_value(self).map_err(|error| Error::RenderError(error.to_string()))
    }

    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string_pretty(&self.render()?)
            .map_err(|error| Error::RenderError(error.to_string()))
    }

    pub fn to_yaml(&self) -> Result<String, Error> {
        serde_yaml::to_string(&self.render()?)
            .map_err(|error| Error::RenderError(error.to_string()))
    }

    /// Checks that every `Ref`, `Fn::GetAtt`, `DependsOn` and literal
    /// `Fn::FindInMap` target is declared. Reports the first one that is not.
    pub fn validate_references(&self) -> Result<(), Error> {
        for (name, resource) in &self.resources {
            for dependency in &resource.depends_on {
                if !self.resources.contains_key(dependency) {
                    return Err(Error::DanglingReference {
                        origin: name.clone(),
                        target: dependency.clone(),
                    });
                }
            }

            for value in resource.values() {
                self.check_value(name, value)?;
            }
        }

        for (name, output) in &self.outputs {
            self.check_value(name, &output.value)?;
            if let Some(export) = &output.export {
                self.check_value(name, &export.name)?;
            }
        }

        return Ok(());
    }

    fn check_value(&self, origin: &str, value: &Value) -> Result<(), Error> {
        let mut dangling: Option<String> = None;
        value.walk(&mut |node| {
            if dangling.is_some() {
                return;
            }
            let missing = match node {
                Value::Ref(target) => {
                    !pseudo::is_pseudo_parameter(target)
                        && !self.parameters.contains_key(target)
                        && !self.resources.contains_key(target)
                }
                Value::GetAtt { resource, .. } => !self.resources.contains_key(resource),
                Value::FindInMap { map, .. } => !self.mappings.contains_key(map),
                _ => false,
            };
            if missing {
                dangling = Some(reference_target(node));
            }
        });

        match dangling {
            Some(target) => Err(Error::DanglingReference {
                origin: origin.to_string(),
                target,
            }),
            None => Ok(()),
        }
    }

    fn ensure_referable_name_is_free(&self, name: &str) -> Result<(), Error> {
        if self.parameters.contains_key(name) || self.resources.contains_key(name) {
            return Err(Error::DuplicateName(name.to_string()));
        }
        return Ok(());
    }
}

fn reference_target(value: &Value) -> String {
    match value {
        Value::Ref(target) => target.clone(),
        Value::GetAtt { resource, .. } => resource.clone(),
        Value::FindInMap { map, .. } => map.clone(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;
    use serde_json::json;

    use super::{CreationPolicy, Error, Output, Parameter, Resource, Template};
    use crate::expr::{find_in_map, get_att, join, pseudo, reference, Value};

    fn instance(image: &str) -> Resource {
        Resource::new("AWS::EC2::Instance").property("ImageId", reference(image))
    }

    #[test]
    fn duplicate_resource_name_is_rejected() {
        let mut template = Template::new();
        template.add_resource("x", instance("AMI")).unwrap();

        let result = template.add_resource("x", Resource::new("AWS::EC2::VPC"));
        assert_eq!(Err(Error::DuplicateName(String::from("x"))), result);
    }

    #[test]
    fn failed_add_leaves_template_unchanged() {
        let mut template = Template::new();
        template
            .add_parameter("AMI", Parameter::new("String"))
            .unwrap();
        template.add_resource("x", instance("AMI")).unwrap();
        let before = template.clone();

        assert_eq!(true, template.add_resource("x", instance("Other")).is_err());
        assert_eq!(true, template.add_parameter("x", Parameter::new("String")).is_err());
        assert_eq!(before, template);
        assert_eq!(before.to_json().unwrap(), template.to_json().unwrap());
    }

    #[test]
    fn parameters_and_resources_share_names() {
        let mut template = Template::new();
        template
            .add_parameter("Shared", Parameter::new("String"))
            .unwrap();

        let result = template.add_resource("Shared", Resource::new("AWS::EC2::VPC"));
        assert_eq!(Err(Error::DuplicateName(String::from("Shared"))), result);
    }

    #[test]
    fn outputs_and_mappings_reject_duplicates() {
        let mut template = Template::new();
        template.add_output("URL", Output::new("a")).unwrap();
        assert_eq!(true, template.add_output("URL", Output::new("b")).is_err());

        template.add_mapping("Arch", IndexMap::new()).unwrap();
        assert_eq!(true, template.add_mapping("Arch", IndexMap::new()).is_err());
    }

    #[test]
    fn renders_expected_shape() {
        let mut template = Template::new();
        template.set_version("2010-09-09");
        template.set_description("demo");
        let image = template
            .add_parameter(
                "AMI",
                Parameter::new("String").description("Image").default("ami-123"),
            )
            .unwrap();
        let vm = template
            .add_resource(
                "vm",
                Resource::new("AWS::EC2::Instance")
                    .property("ImageId", &image)
                    .creation_policy(CreationPolicy::signal_timeout("PT15M")),
            )
            .unwrap();
        template
            .add_output("Id", Output::new(&vm).description("Instance id"))
            .unwrap();

        assert_eq!(
            json!({
                "AWSTemplateFormatVersion": "2010-09-09",
                "Description": "demo",
                "Parameters": {
                    "AMI": {"Type": "String", "Description": "Image", "Default": "ami-123"}
                },
                "Resources": {
                    "vm": {
                        "Type": "AWS::EC2::Instance",
                        "Properties": {"ImageId": {"Ref": "AMI"}},
                        "CreationPolicy": {"ResourceSignal": {"Timeout": "PT15M"}}
                    }
                },
                "Outputs": {
                    "Id": {"Description": "Instance id", "Value": {"Ref": "vm"}}
                }
            }),
            template.render().unwrap()
        );
    }

    #[test]
    fn empty_template_still_has_resources() {
        assert_eq!(json!({"Resources": {}}), Template::new().render().unwrap());
    }

    #[test]
    fn depends_on_is_a_string_when_single() {
        let mut template = Template::new();
        template.add_resource("a", Resource::new("T")).unwrap();
        template.add_resource("b", Resource::new("T")).unwrap();
        template
            .add_resource("one", Resource::new("T").depends_on("a"))
            .unwrap();
        template
            .add_resource("two", Resource::new("T").depends_on("a").depends_on("b"))
            .unwrap();

        let rendered = template.render().unwrap();
        assert_eq!(json!("a"), rendered["Resources"]["one"]["DependsOn"]);
        assert_eq!(json!(["a", "b"]), rendered["Resources"]["two"]["DependsOn"]);
    }

    #[test]
    fn render_is_deterministic_and_keeps_insertion_order() {
        let mut template = Template::new();
        for name in ["zeta", "alpha", "mid"] {
            template.add_resource(name, Resource::new("T")).unwrap();
        }

        let first = template.to_json().unwrap();
        let second = template.to_json().unwrap();
        assert_eq!(first, second);

        let rendered = template.render().unwrap();
        let names: Vec<&String> = rendered["Resources"].as_object().unwrap().keys().collect();
        assert_eq!(vec!["zeta", "alpha", "mid"], names);
    }

    #[test]
    fn yaml_output_parses_back() {
        let mut template = Template::new();
        template.add_resource("vm", instance("AWS::NoValue")).unwrap();

        let yaml = template.to_yaml().unwrap();
        let parsed: serde_json::Value = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(template.render().unwrap(), parsed);
    }

    #[test]
    fn references_to_declared_names_validate() {
        let mut template = Template::new();
        let mut arch = IndexMap::new();
        arch.insert(
            String::from("t2.micro"),
            IndexMap::from([(String::from("Arch"), Value::from("HVM64"))]),
        );
        template.add_mapping("Arch", arch).unwrap();
        template
            .add_parameter("Size", Parameter::new("String"))
            .unwrap();
        template
            .add_resource(
                "vm",
                Resource::new("AWS::EC2::Instance")
                    .property("InstanceType", reference("Size"))
                    .property("Tags", join("", [reference(pseudo::STACK_ID)]))
                    .property("Arch", find_in_map("Arch", reference("Size"), "Arch")),
            )
            .unwrap();
        template
            .add_resource("ip", Resource::new("AWS::EC2::EIP").depends_on("vm"))
            .unwrap();
        template
            .add_output("Ip", Output::new(get_att("vm", "PublicIp")))
            .unwrap();

        assert_eq!(Ok(()), template.validate_references());
    }

    #[test]
    fn dangling_references_are_reported() {
        let mut template = Template::new();
        template.add_resource("vm", instance("Missing")).unwrap();
        assert_eq!(
            Err(Error::DanglingReference {
                origin: String::from("vm"),
                target: String::from("Missing"),
            }),
            template.validate_references()
        );

        let mut template = Template::new();
        template
            .add_resource("ip", Resource::new("AWS::EC2::EIP").depends_on("Gateway"))
            .unwrap();
        assert_eq!(true, template.validate_references().is_err());

        let mut template = Template::new();
        template
            .add_output("Url", Output::new(get_att("Nope", "PublicIp")))
            .unwrap();
        assert_eq!(true, template.validate_references().is_err());

        let mut template = Template::new();
        template
            .add_resource(
                "vm",
                Resource::new("T").property("Arch", find_in_map("NoMap", "a", "b")),
            )
            .unwrap();
        assert_eq!(true, template.validate_references().is_err());
    }

    #[test]
    fn unknown_aws_names_are_dangling() {
        let mut template = Template::new();
        template.add_resource("vm", instance("AWS::Bogus")).unwrap();
        assert_eq!(
            Err(Error::DanglingReference {
                origin: String::from("vm"),
                target: String::from("AWS::Bogus"),
            }),
            template.validate_references()
        );
    }
}
