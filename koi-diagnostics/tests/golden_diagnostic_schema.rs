use koi_diagnostics::{error_codes, Diagnostic, DiagnosticEngine, Span};

#[test]
fn test_diagnostics_json_has_expected_shape() {
    let mut engine = DiagnosticEngine::new();

    let span = Span::new("main.koi".to_string(), 2, 5, 3);
    let diag = Diagnostic::error(
        error_codes::UNDEFINED_VARIABLE,
        "cannot find value `foo` in this scope".to_string(),
        span,
    )
    .with_help("did you mean `foo_bar`?".to_string());

    engine.emit(diag);

    let json = engine.to_json();
    let v: serde_json::Value = serde_json::from_str(&json).expect("valid json");

    let diagnostics = v["diagnostics"].as_array().expect("diagnostics array");
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0]["code"], error_codes::UNDEFINED_VARIABLE);
    assert_eq!(diagnostics[0]["level"], "error");
    assert_eq!(diagnostics[0]["line"], 2);
}
