use indexmap::IndexMap;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

/// Names CloudFormation resolves on its own. They can be used as `Ref`
/// targets without being declared in the template.
pub mod pseudo {
    pub const ACCOUNT_ID: &str = "AWS::AccountId";
    pub const NO_VALUE: &str = "AWS::NoValue";
    pub const REGION: &str = "AWS::Region";
    pub const STACK_ID: &str = "AWS::StackId";
    pub const STACK_NAME: &str = "AWS::StackName";

    pub const ALL: [&str; 5] = [ACCOUNT_ID, NO_VALUE, REGION, STACK_ID, STACK_NAME];

    pub fn is_pseudo_parameter(name: &str) -> bool {
        ALL.contains(&name)
    }
}

/// A property value, output value or metadata value.
///
/// Intrinsic functions are kept as their own variants so the serializer can
/// emit the `Ref` / `Fn::*` shapes and the reference checker can find them.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Bool(bool),
    Integer(i64),
    List(Vec<Value>),
    Object(IndexMap<String, Value>),
    Ref(String),
    Join {
        delimiter: String,
        parts: Vec<Value>,
    },
    FindInMap {
        map: String,
        top_level_key: Box<Value>,
        second_level_key: Box<Value>,
    },
    GetAtt {
        resource: String,
        attribute: String,
    },
    Base64(Box<Value>),
}

impl Value {
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Object(
            entries
                .into_iter()
                .map(|(key, value)| (key.into(), value))
                .collect(),
        )
    }

    pub fn list<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    /// Calls `visit` on this value and every value nested inside it.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Value)) {
        visit(self);
        match self {
            Value::List(items) => items.iter().for_each(|item| item.walk(visit)),
            Value::Object(entries) => entries.values().for_each(|value| value.walk(visit)),
            Value::Join { parts, .. } => parts.iter().for_each(|part| part.walk(visit)),
            Value::FindInMap {
                top_level_key,
                second_level_key,
                ..
            } => {
                top_level_key.walk(visit);
                second_level_key.walk(visit);
            }
            Value::Base64(inner) => inner.walk(visit),
            Value::String(_)
            | Value::Bool(_)
            | Value::Integer(_)
            | Value::Ref(_)
            | Value::GetAtt { .. } => {}
        }
    }
}

pub fn reference(name: impl Into<String>) -> Value {
    Value::Ref(name.into())
}

pub fn join<I, V>(delimiter: &str, parts: I) -> Value
where
    I: IntoIterator<Item = V>,
    V: Into<Value>,
{
    Value::Join {
        delimiter: delimiter.to_string(),
        parts: parts.into_iter().map(Into::into).collect(),
    }
}

pub fn find_in_map(
    map: impl Into<String>,
    top_level_key: impl Into<Value>,
    second_level_key: impl Into<Value>,
) -> Value {
    Value::FindInMap {
        map: map.into(),
        top_level_key: Box::new(top_level_key.into()),
        second_level_key: Box::new(second_level_key.into()),
    }
}

pub fn get_att(resource: impl Into<String>, attribute: impl Into<String>) -> Value {
    Value::GetAtt {
        resource: resource.into(),
        attribute: attribute.into(),
    }
}

pub fn base64(value: impl Into<Value>) -> Value {
    Value::Base64(Box::new(value.into()))
}

/// Resource tags as the `[{"Key": .., "Value": ..}]` list EC2 resources take.
pub fn tags<K, I>(entries: I) -> Value
where
    K: Into<String>,
    I: IntoIterator<Item = (K, Value)>,
{
    Value::List(
        entries
            .into_iter()
            .map(|(key, value)| {
                Value::object([("Key", Value::String(key.into())), ("Value", value)])
            })
            .collect(),
    )
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::String(value) => serializer.serialize_str(value),
            Value::Bool(value) => serializer.serialize_bool(*value),
            Value::Integer(value) => serializer.serialize_i64(*value),
            Value::List(items) => items.serialize(serializer),
            Value::Object(entries) => entries.serialize(serializer),
            Value::Ref(name) => single_entry(serializer, "Ref", name),
            Value::Join { delimiter, parts } => {
                single_entry(serializer, "Fn::Join", &(delimiter, parts))
            }
            Value::FindInMap {
                map,
                top_level_key,
                second_level_key,
            } => single_entry(
                serializer,
                "Fn::FindInMap",
                &(map, top_level_key, second_level_key),
            ),
            Value::GetAtt {
                resource,
                attribute,
            } => single_entry(serializer, "Fn::GetAtt", &(resource, attribute)),
            Value::Base64(inner) => single_entry(serializer, "Fn::Base64", inner),
        }
    }
}

fn single_entry<S, T>(serializer: S, key: &str, value: &T) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: Serialize + ?Sized,
{
    let mut map = serializer.serialize_map(Some(1))?;
    map.serialize_entry(key, value)?;
    map.end()
}
