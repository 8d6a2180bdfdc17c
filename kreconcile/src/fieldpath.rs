use core::fmt;
use std::{ops::Deref, str::FromStr};

use anyhow::{Context as _, bail};
use serde_yaml::{Mapping, Value};

use crate::{manifest::Str, resource::value_type};

/// A `/` separated path into a document, e.g. `spec/template/spec/containers[]/image`.
/// A segment ending in `[]` visits every element of the sequence at that field.
#[derive(Clone, PartialEq, Eq)]
pub struct FieldPath {
    segments: Box<[FieldPathSegment]>,
}

impl fmt::Debug for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, r#""{self}""#)
    }
}

impl Deref for FieldPath {
    type Target = [FieldPathSegment];

    fn deref(&self) -> &Self::Target {
        &self.segments
    }
}

pub type PathRef<'a> = &'a [FieldPathSegment];

impl FromStr for FieldPath {
    type Err = anyhow::Error;

    // TODO Need to handle escaping of '/' by '\'
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            bail!("path cannot be empty");
        }

        let segments = s
            .split('/')
            .map(|segment| segment.parse::<FieldPathSegment>())
            .collect::<Result<Box<_>, _>>()?;

        Ok(FieldPath { segments })
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            self.segments
                .iter()
                .map(|segment| segment.to_string())
                .collect::<Vec<_>>()
                .join("/")
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldPathSegment {
    Field(Str),
    Array(Str),
}

impl fmt::Display for FieldPathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldPathSegment::Field(field) => write!(f, "{field}"),
            FieldPathSegment::Array(field) => write!(f, "{field}[]"),
        }
    }
}

impl FromStr for FieldPathSegment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let segment = match s.strip_suffix("[]") {
            Some(s) => FieldPathSegment::Array(s.into()),
            None => FieldPathSegment::Field(s.into()),
        };

        match &segment {
            FieldPathSegment::Field(name) | FieldPathSegment::Array(name) if name.is_empty() => {
                bail!("path segment cannot be empty")
            }
            _ => Ok(segment),
        }
    }
}

impl FieldPath {
    /// A path to a single top level field.
    pub fn field(name: &str) -> Self {
        FieldPath {
            segments: Box::new([FieldPathSegment::Field(name.into())]),
        }
    }

    /// Call `f` on every value the path resolves to and return how many there were.
    ///
    /// Missing fields are skipped unless `create` is set, in which case intermediate mappings
    /// are created and the final field starts out as null. Sequences are never created.
    pub fn apply(
        &self,
        root: &mut Mapping,
        create: bool,
        f: &mut impl FnMut(&mut Value) -> anyhow::Result<()>,
    ) -> anyhow::Result<usize> {
        fn go(
            curr: &mut Mapping,
            path: PathRef<'_>,
            create: bool,
            f: &mut impl FnMut(&mut Value) -> anyhow::Result<()>,
        ) -> anyhow::Result<usize> {
            let Some((segment, rest)) = path.split_first() else {
                return Ok(0);
            };

            match segment {
                FieldPathSegment::Field(field) => {
                    if !curr.contains_key(field.as_str()) {
                        if !create {
                            return Ok(0);
                        }
                        let init = if rest.is_empty() {
                            Value::Null
                        } else {
                            Value::Mapping(Mapping::new())
                        };
                        curr.insert(Value::from(field.as_str()), init);
                    }

                    let val = curr
                        .get_mut(field.as_str())
                        .with_context(|| format!("missing field `{field}`"))?;
                    if rest.is_empty() {
                        f(val)?;
                        return Ok(1);
                    }

                    if val.is_null() && create {
                        *val = Value::Mapping(Mapping::new());
                    }

                    match val {
                        Value::Mapping(map) => go(map, rest, create, f),
                        Value::Null => Ok(0),
                        other => bail!("expected a mapping at `{field}`, found {}", value_type(other)),
                    }
                }
                FieldPathSegment::Array(field) => match curr.get_mut(field.as_str()) {
                    None | Some(Value::Null) => Ok(0),
                    Some(Value::Sequence(seq)) => {
                        let mut count = 0;
                        for item in seq {
                            if rest.is_empty() {
                                f(item)?;
                                count += 1;
                                continue;
                            }

                            match item {
                                Value::Mapping(map) => count += go(map, rest, create, f)?,
                                Value::Null => {}
                                other => bail!(
                                    "expected mapping elements in `{field}`, found {}",
                                    value_type(other)
                                ),
                            }
                        }
                        Ok(count)
                    }
                    Some(other) => bail!(
                        "expected a sequence at `{field}`, found {}",
                        value_type(other)
                    ),
                },
            }
        }

        go(root, &self.segments, create, f).with_context(|| format!("applying field path `{self}`"))
    }
}
