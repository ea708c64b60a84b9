use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

/// A template value: either a literal string or an intrinsic function that
/// the provisioning engine resolves at deploy time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Literal(String),
    /// `{"Ref": "<logical id>"}`
    Ref(String),
    /// `{"Fn::GetAtt": ["<logical id>", "<attribute>"]}`
    GetAtt { resource: String, attribute: String },
    /// `{"Fn::Join": ["<delimiter>", [...]]}`
    Join { delimiter: String, parts: Vec<Expr> },
}

impl Expr {
    pub fn reference(logical_id: impl Into<String>) -> Self {
        Self::Ref(logical_id.into())
    }

    pub fn get_att(logical_id: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::GetAtt {
            resource: logical_id.into(),
            attribute: attribute.into(),
        }
    }

    pub fn join(delimiter: impl Into<String>, parts: Vec<Expr>) -> Self {
        Self::Join {
            delimiter: delimiter.into(),
            parts,
        }
    }
}

impl From<&str> for Expr {
    fn from(s: &str) -> Self {
        Self::Literal(s.to_string())
    }
}

impl From<String> for Expr {
    fn from(s: String) -> Self {
        Self::Literal(s)
    }
}

struct Pair<'a, A, B>(&'a A, &'a B);

impl<A: Serialize, B: Serialize> Serialize for Pair<'_, A, B> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(2))?;
        seq.serialize_element(self.0)?;
        seq.serialize_element(self.1)?;
        seq.end()
    }
}

impl Serialize for Expr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Literal(s) => serializer.serialize_str(s),
            Self::Ref(id) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("Ref", id)?;
                map.end()
            }
            Self::GetAtt {
                resource,
                attribute,
            } => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("Fn::GetAtt", &Pair(resource, attribute))?;
                map.end()
            }
            Self::Join { delimiter, parts } => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("Fn::Join", &Pair(delimiter, parts))?;
                map.end()
            }
        }
    }
}
