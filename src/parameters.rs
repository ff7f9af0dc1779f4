use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// Fields the solver always expects to find in a model directory,
/// whether or not they are being inverted for.
pub const SOLVER_FIELDS: [&str; 3] = ["vp", "vs", "rho"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Material {
    Acoustic,
    #[default]
    Elastic,
}

/// Density is often poorly constrained, so it is either held at the
/// initial model or inverted alongside the wave speeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DensityPolicy {
    #[default]
    Constant,
    Variable,
}

/// Ordered material parameter names. Order is significant: it fixes the
/// layout of flattened model vectors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSet {
    names: SmallVec<[String; 3]>,
}

impl ParameterSet {
    pub fn from_policy(material: Material, density: DensityPolicy) -> Self {
        let mut names: SmallVec<[String; 3]> = SmallVec::new();
        names.push("vp".to_string());
        if material == Material::Elastic {
            names.push("vs".to_string());
        }
        if density == DensityPolicy::Variable {
            names.push("rho".to_string());
        }
        Self { names }
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { names: names.into_iter().map(Into::into).collect() }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl fmt::Display for ParameterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.names.join(", "))
    }
}
