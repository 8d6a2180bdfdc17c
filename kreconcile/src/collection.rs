use core::fmt;

use crate::{resource::Resource, yaml};

/// An ordered set of resources. Order is significant: it determines how resources are grouped
/// back into files and the order of a stream.
#[derive(Clone, Default, PartialEq)]
pub struct ResourceCollection {
    resources: Vec<Resource>,
}

impl fmt::Debug for ResourceCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.resources.iter().map(|r| r.to_string()))
            .finish()
    }
}

impl fmt::Display for ResourceCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_stream().map_err(|_| fmt::Error)?)
    }
}

impl ResourceCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn push(&mut self, resource: Resource) {
        self.resources.push(resource);
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = &Resource> + DoubleEndedIterator {
        self.resources.iter()
    }

    pub fn iter_mut(
        &mut self,
    ) -> impl ExactSizeIterator<Item = &mut Resource> + DoubleEndedIterator {
        self.resources.iter_mut()
    }

    pub fn retain(&mut self, f: impl FnMut(&Resource) -> bool) {
        self.resources.retain(f);
    }

    /// Render every resource as one `---` separated stream, keeping the comments above each
    /// loaded document.
    pub fn to_stream(&self) -> anyhow::Result<String> {
        let mut buf = String::new();
        for (i, resource) in self.resources.iter().enumerate() {
            if i > 0 {
                yaml::push_line_aligned(&mut buf, yaml::SEPARATOR);
            }
            if let Some(source) = resource.source() {
                yaml::push_line_aligned(&mut buf, &yaml::without_separators(&source.leading));
            }
            yaml::push_line_aligned(&mut buf, &resource.body()?);
        }
        Ok(buf)
    }
}

impl FromIterator<Resource> for ResourceCollection {
    fn from_iter<I: IntoIterator<Item = Resource>>(iter: I) -> Self {
        Self {
            resources: iter.into_iter().collect(),
        }
    }
}

impl Extend<Resource> for ResourceCollection {
    fn extend<I: IntoIterator<Item = Resource>>(&mut self, iter: I) {
        self.resources.extend(iter);
    }
}

impl IntoIterator for ResourceCollection {
    type Item = Resource;
    type IntoIter = std::vec::IntoIter<Resource>;

    fn into_iter(self) -> Self::IntoIter {
        self.resources.into_iter()
    }
}

impl<'a> IntoIterator for &'a ResourceCollection {
    type Item = &'a Resource;
    type IntoIter = std::slice::Iter<'a, Resource>;

    fn into_iter(self) -> Self::IntoIter {
        self.resources.iter()
    }
}
