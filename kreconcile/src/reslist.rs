use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::{
    manifest::{Str, Symbol as _, apiversion, kind},
    yaml,
};

/// The message exchanged with a function: its configuration and the resources to transform.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceList {
    #[serde(default = "default_api_version")]
    api_version: Str,
    kind: kind::ResourceList,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_config: Option<Mapping>,
    #[serde(default)]
    items: Vec<Value>,
}

fn default_api_version() -> Str {
    apiversion::ConfigV1::VALUE.into()
}

impl ResourceList {
    pub(crate) fn new(function_config: Mapping, items: Vec<Value>) -> Self {
        Self {
            api_version: default_api_version(),
            kind: kind::ResourceList,
            function_config: Some(function_config),
            items,
        }
    }

    /// Read a function's output, either a single `ResourceList` or a plain stream of documents.
    pub(crate) fn parse_output(output: Vec<u8>) -> anyhow::Result<Vec<Value>> {
        let text = String::from_utf8(output).context("output is not valid UTF-8")?;
        let mut documents = yaml::parse_stream(&text)?;

        let is_list = matches!(
            documents.as_slice(),
            [document] if document.get("kind").and_then(Value::as_str) == Some(kind::ResourceList::VALUE)
        );
        if !is_list {
            return Ok(documents);
        }

        let list = serde_yaml::from_value::<ResourceList>(documents.remove(0))
            .context("parsing ResourceList")?;
        Ok(list.items)
    }
}
