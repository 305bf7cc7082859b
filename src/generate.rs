use log::info;

use crate::template::{Error, Handle, Output, Parameter, Resource, Template};

pub const INSTANCE_TYPE: &str = "AWS::EC2::Instance";
pub const OUTPUT_PREFIX: &str = "Instanceid";
pub const DEFAULT_IMAGE_PARAMETER: &str = "imageid";
pub const DEFAULT_SIZE_PARAMETER: &str = "InstanceSize";

pub fn default_instance_names() -> Vec<String> {
    (1..=4).map(|index| format!("instance{}", index)).collect()
}

/// Logical names of the two parameters every generated instance refers to.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceParameters {
    pub image: String,
    pub size: String,
}

impl Default for InstanceParameters {
    fn default() -> Self {
        Self {
            image: String::from(DEFAULT_IMAGE_PARAMETER),
            size: String::from(DEFAULT_SIZE_PARAMETER),
        }
    }
}

pub fn output_name(instance_name: &str) -> String {
    format!("{}{}", OUTPUT_PREFIX, instance_name)
}

/// Adds one instance and one `Instanceid<name>` output per name, all of them
/// pointing at the shared image and size parameters.
///
/// Stops at the first name that is already taken.
pub fn add_instances<S: AsRef<str>>(
    template: &mut Template,
    names: &[S],
    image: &Handle,
    size: &Handle,
) -> Result<Vec<Handle>, Error> {
    let mut handles = Vec::with_capacity(names.len());

    for name in names {
        let name = name.as_ref();
        let output = output_name(name);
        if template.has_output(&output) {
            return Err(Error::DuplicateName(output));
        }

        let instance = template.add_resource(
            name,
            Resource::new(INSTANCE_TYPE)
                .property("ImageId", image)
                .property("InstanceType", size),
        )?;
        template.add_output(
            &output,
            Output::new(&instance).description("InstanceId of the newly created EC2 instance"),
        )?;
        handles.push(instance);
    }

    return Ok(handles);
}

pub fn multi_instance_template<S: AsRef<str>>(
    names: &[S],
    parameters: &InstanceParameters,
) -> Result<Template, Error> {
    let mut template = Template::new();

    let image = template.add_parameter(
        &parameters.image,
        Parameter::new("String").description("AMI ID for instance"),
    )?;
    let size = template.add_parameter(
        &parameters.size,
        Parameter::new("String").description("Set the instance size"),
    )?;

    let instances = add_instances(&mut template, names, &image, &size)?;
    info!("Generated template with {} instances", instances.len());

    return Ok(template);
}
