#![no_main]
use std::sync::Arc;

use libfuzzer_sys::fuzz_target;

use stagegate_core::config::gates::GateDefinition;
use stagegate_core::config::GateConfig;
use stagegate_engine::audit::MemoryAuditSink;
use stagegate_engine::definitions::StaticDefinitions;
use stagegate_engine::gates::GateEvaluator;
use stagegate_engine::requirements::checker::RequirementChecker;
use stagegate_engine::subject::JsonSubject;

// Input: {"gate": <gate definition>, "subject": <subject document>}.
// Any well-formed pair must evaluate without panicking.
fuzz_target!(|data: &[u8]| {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };
    let Ok(gate) = serde_json::from_value::<GateDefinition>(value["gate"].clone()) else {
        return;
    };
    let Ok(subject) = JsonSubject::from_value(value["subject"].clone(), "Project") else {
        return;
    };

    let config: GateConfig = serde_json::from_str(r#"{"gates": []}"#).expect("empty config");
    let defs = StaticDefinitions::new(config).expect("no gates, no duplicates");
    let sink = Arc::new(MemoryAuditSink::new());
    let evaluator = GateEvaluator::new(RequirementChecker::default(), Arc::new(defs), sink.clone());

    let result = evaluator.evaluate(&subject, &gate).expect("memory sink never fails");
    assert!(result.total_count() <= gate.active_requirements().len());
    assert_eq!(result.passed(), result.failed_count() == 0);
    assert!((0.0..=100.0).contains(&result.progress_percentage()));
    assert_eq!(sink.len(), 1);
});
