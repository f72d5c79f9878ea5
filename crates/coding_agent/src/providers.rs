use std::sync::Arc;

use agent_provider::ModelProvider;
use agent_provider_mock::{ScriptedProvider, MOCK_PROVIDER_ID};

pub fn provider_for_id(provider_id: &str, model: &str) -> Result<Arc<dyn ModelProvider>, String> {
    match provider_id {
        MOCK_PROVIDER_ID => Ok(Arc::new(ScriptedProvider::new(model))),
        unknown => Err(format!(
            "Unsupported provider '{unknown}'. Available providers: {MOCK_PROVIDER_ID}"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_for_id_supports_mock() {
        let provider = provider_for_id("mock", "mock-large").expect("mock provider should resolve");
        assert_eq!(provider.profile().provider_id, "mock");
        assert_eq!(provider.profile().model_id, "mock-large");
    }

    #[test]
    fn provider_for_id_rejects_unknown_provider() {
        let error = match provider_for_id("custom", "mock") {
            Ok(_) => panic!("unknown providers should fail"),
            Err(error) => error,
        };

        assert!(error.contains("Unsupported provider 'custom'"));
    }
}
