//! Fixed-output collector for tests and config smoke checks.

use serde_json::{Value, json};

use crate::collectors::{BlockingCollector, CollectorArgs};
use crate::context::Fragment;
use crate::error::CollectorError;

#[derive(Debug, Clone)]
pub struct DummyCollector {
    fragment: Fragment,
}

impl DummyCollector {
    pub fn new(fragment: Fragment) -> Self {
        Self { fragment }
    }

    /// Option `fragment` (an object) is returned verbatim. Otherwise the output
    /// is `{"dummy_data": "hello", "value": <value option, default 42>}`.
    pub fn from_args(args: &CollectorArgs) -> Result<Self, CollectorError> {
        let options = args.options();
        match options.get("fragment") {
            Some(Value::Object(map)) => Ok(Self::new(map.clone())),
            Some(other) => Err(CollectorError::InvalidOption {
                option: "fragment".to_string(),
                reason: format!("expected an object, got {other}"),
            }),
            None => {
                let value = options.int("value", 42)?;
                let fragment = json!({"dummy_data": "hello", "value": value});
                Ok(Self::new(fragment.as_object().cloned().unwrap_or_default()))
            }
        }
    }
}

impl BlockingCollector for DummyCollector {
    fn collect(&self) -> Result<Fragment, CollectorError> {
        Ok(self.fragment.clone())
    }
}
