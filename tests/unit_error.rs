/// Unit tests for DiError and ProviderError display and sources

use scopewire::{key_of_named, key_of_type, DiError, DiResult, ProviderError, ScopeName};
use std::error::Error;

#[derive(Debug)]
struct ServiceA;
#[derive(Debug)]
struct ServiceB;

#[test]
fn test_error_display_resolution() {
    let error = DiError::Resolution {
        key: key_of_named::<u32>("port"),
        reason: "not registered".to_string(),
    };
    assert_eq!(error.to_string(), "cannot resolve u32[port]: not registered");
}

#[test]
fn test_error_display_type_mismatch() {
    let error = DiError::TypeMismatch {
        key: key_of_type::<String>(),
        expected: "u8",
    };
    let display_str = error.to_string();
    assert!(display_str.contains("type mismatch for alloc::string::String"));
    assert!(display_str.ends_with("expected u8"));
}

#[test]
fn test_error_display_circular_uses_short_names() {
    let chain = vec![
        key_of_type::<ServiceA>(),
        key_of_type::<ServiceB>(),
        key_of_type::<ServiceA>(),
    ];
    let error = DiError::Circular { chain };
    assert_eq!(error.to_string(), "circular dependency: ServiceA -> ServiceB -> ServiceA");
    assert_eq!(error.cycle().map(|c| c.len()), Some(3));
}

#[test]
fn test_error_display_scope_with_and_without_key() {
    let with_key = DiError::Scope {
        key: Some(key_of_type::<u8>()),
        message: "scope `request` is not active".to_string(),
    };
    assert_eq!(with_key.to_string(), "scope error for u8: scope `request` is not active");

    let without_key = DiError::Scope {
        key: None,
        message: "container is closed".to_string(),
    };
    assert_eq!(without_key.to_string(), "scope error: container is closed");
    assert!(without_key.cycle().is_none());
}

#[test]
fn test_error_display_depth_exceeded() {
    let error = DiError::DepthExceeded(100);
    assert_eq!(error.to_string(), "max resolution depth 100 exceeded");
}

#[test]
fn test_provider_error_is_transparent_and_keeps_source() {
    let error: DiError = ProviderError::Construction {
        key: key_of_type::<u8>(),
        source: "connection refused".into(),
    }
    .into();

    assert_eq!(error.to_string(), "provider for u8 failed: connection refused");
    // transparent: source() skips straight to the user error
    let source = error.source().map(|s| s.to_string());
    assert_eq!(source.as_deref(), Some("connection refused"));
}

#[test]
fn test_teardown_error_lists_every_failure() {
    let failures = vec![
        ProviderError::Hook {
            key: key_of_type::<u8>(),
            hook: "close".to_string(),
            source: "first".into(),
        },
        ProviderError::Hook {
            key: key_of_type::<u16>(),
            hook: "close".to_string(),
            source: "second".into(),
        },
    ];
    let error = ProviderError::Teardown {
        scope: ScopeName::REQUEST,
        failures,
    };
    let display_str = error.to_string();
    assert!(display_str.starts_with("2 destroy hook(s) failed while exiting scope `request`"));
    assert!(display_str.contains("hook `close` on u8 failed: first; hook `close` on u16 failed: second"));
}

#[test]
fn test_di_result_propagates_with_question_mark() {
    fn inner() -> DiResult<u8> {
        Err(DiError::DepthExceeded(1))
    }
    fn outer() -> DiResult<u8> {
        let v = inner()?;
        Ok(v + 1)
    }
    assert!(matches!(outer(), Err(DiError::DepthExceeded(1))));
}
