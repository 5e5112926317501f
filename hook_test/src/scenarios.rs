mod basic;
mod batch;
mod recursion;

pub fn run_all() {
    run("install-roundtrip", basic::scenario_install_roundtrip);
    run("remove-idempotent", basic::scenario_remove_idempotent);
    run("unknown-symbol", basic::scenario_unknown_symbol);
    run("thunk-failure-undo", basic::scenario_thunk_failure_undo);
    run("records", basic::scenario_records);
    run(
        "hidden-lookup-probe-once",
        basic::scenario_hidden_lookup_probe_once,
    );
    run("caller-origin-guard", recursion::scenario_caller_origin_guard);
    run("entry-offset-bypass", recursion::scenario_entry_offset_bypass);
    run("mixed-callers", recursion::scenario_mixed_callers);
    run("batch-atomic-rollback", batch::scenario_batch_atomic_rollback);
    run(
        "batch-success-remove-all",
        batch::scenario_batch_success_remove_all,
    );
}

fn run(name: &str, scenario: fn()) {
    println!("scenario: {name}");
    scenario();
}
