use badi_sdk::capability::{CapabilitySpec, ParamSpec, ParamType};
use badi_sdk::errors::{BadiErrorExt, EngineError};
use proptest::prelude::*;
use serde_json::{json, Map, Value};

proptest! {
    #[test]
    fn test_error_user_hint_never_echoes_detail(detail in "[a-z0-9_/.]{12,40}") {
        let errs = vec![
            EngineError::Config(detail.clone()),
            EngineError::Database(detail.clone()),
            EngineError::Planning(detail.clone()),
            EngineError::Parameter(detail.clone()),
            EngineError::Capability(detail.clone()),
            EngineError::MemoryGateway(detail.clone()),
            EngineError::PathDenied(std::path::PathBuf::from(&detail)),
        ];

        for err in errs {
            let hint = err.user_hint();
            prop_assert!(!hint.is_empty());
            prop_assert!(!hint.contains(&detail));
            prop_assert!(!err.kind().is_empty());
        }
    }
}

fn archive_spec() -> CapabilitySpec {
    CapabilitySpec::new("move_old_files", "Archive stale files")
        .param(ParamSpec::required("source_path", ParamType::Path, "Folder"))
        .param(ParamSpec::required("days", ParamType::Integer, "Age threshold"))
        .param(ParamSpec::optional("archive_path", ParamType::Path, "Target"))
        .requires_confirmation()
}

proptest! {
    // Any key outside the schema is rejected regardless of the other keys.
    #[test]
    fn test_unknown_keys_always_rejected(key in "[a-z]{3,12}", days in 0i64..10_000) {
        prop_assume!(!["source_path", "days", "archive_path"].contains(&key.as_str()));

        let mut params = Map::new();
        params.insert("source_path".into(), json!("/tmp"));
        params.insert("days".into(), json!(days));
        params.insert(key, Value::Bool(true));

        let result = archive_spec().validate(&params);
        prop_assert!(matches!(result, Err(EngineError::Parameter(_))));
    }

    #[test]
    fn test_well_typed_params_accepted(days in 0i64..10_000, path in "/[a-z]{1,10}") {
        let mut params = Map::new();
        params.insert("source_path".into(), json!(path));
        params.insert("days".into(), json!(days));

        let input = archive_spec().validate(&params).unwrap();
        prop_assert_eq!(input.param_i64("days").unwrap(), days);
    }
}
