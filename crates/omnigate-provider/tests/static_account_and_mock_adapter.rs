use std::collections::{HashMap, HashSet};

use omnigate_core::{
    Account, BifrostError, BifrostRequest, BifrostResponse, DispatchContext, ExtraFields, Key,
    ProviderAdapter, ProviderConfig, RequestInput, RequestKind, ResponseBody,
};
use omnigate_provider::{MockAdapter, Scripted, StaticAccount};

fn chat_request() -> BifrostRequest {
    BifrostRequest {
        provider: "openai".to_string(),
        model: "gpt-4o".to_string(),
        input: RequestInput::ChatCompletion { messages: vec![] },
        params: None,
        fallbacks: vec![],
    }
}

fn scripted_response() -> BifrostResponse {
    BifrostResponse {
        id: Some("resp_1".to_string()),
        body: ResponseBody::ChatCompletion { choices: vec![] },
        usage: None,
        raw: None,
        extra: ExtraFields {
            provider: String::new(),
            model_requested: String::new(),
            request_type: RequestKind::ChatCompletion,
            latency: std::time::Duration::ZERO,
        },
    }
}

/// Exercises the reference `Account`/`ProviderAdapter` implementations end
/// to end rather than the dispatcher internals, which have their own test
/// suite already.
#[tokio::test]
async fn static_account_selects_a_key_by_model_support() {
    let account = StaticAccount::empty();
    account.replace_configs(HashMap::from([(
        "openai".to_string(),
        ProviderConfig::default(),
    )]));
    account.replace_keys(HashMap::from([(
        "openai".to_string(),
        vec![
            Key {
                value: "sk-a".to_string(),
                models: HashSet::from(["gpt-4o".to_string()]),
                weight: 1.0,
            },
            Key {
                value: "sk-b".to_string(),
                models: HashSet::from(["gpt-4o-mini".to_string()]),
                weight: 1.0,
            },
        ],
    )]));

    assert_eq!(account.configured_providers(), vec!["openai".to_string()]);
    assert!(account.config_for_provider("anthropic").await.is_err());

    let ctx = DispatchContext::new("trace-1");
    let keys = account.keys_for_provider(&ctx, "openai").await.unwrap();
    let selected = omnigate_core::select_key(&keys, "gpt-4o").unwrap();
    assert_eq!(selected.value, "sk-a");
}

#[tokio::test]
async fn mock_adapter_replays_scripted_outcomes_in_order() {
    let adapter = MockAdapter::new(
        "openai",
        vec![
            Scripted::Response(scripted_response()),
            Scripted::Error(BifrostError::provider(Some(500), "upstream boom")),
        ],
    );
    let ctx = DispatchContext::new("trace-1");
    let request = chat_request();

    let first = adapter.chat_completion(&ctx, None, &request).await;
    assert!(first.is_ok());
    assert_eq!(first.unwrap().extra.provider, "openai");

    let second = adapter.chat_completion(&ctx, None, &request).await;
    assert!(second.is_err());
}
