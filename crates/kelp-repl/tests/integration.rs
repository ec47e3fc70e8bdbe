//! Integration tests for the kelp REPL front end.
//!
//! These drive whole command lines through `Repl::run_command_line`, the way
//! the interactive loop does, and inspect the engine state behind it.

use kelp_repl::Repl;
use kelp_testutil::test_engine;
use kelp_types::Value;

fn repl() -> (Repl, kelp_testutil::SharedBuf) {
    let (engine, out, _err) = test_engine();
    (Repl::with_engine(engine), out)
}

#[test]
fn expression_line_sets_the_value() {
    let (mut repl, _) = repl();
    assert!(repl.run_command_line("4"));
    assert_eq!(repl.engine().value(), &Value::Int(4));
}

#[test]
fn prompt_follows_the_continuation_state() {
    let (mut repl, _) = repl();
    assert_eq!(repl.prompt(), ">>> ");

    repl.run_command_line("function area(r)");
    assert_eq!(repl.prompt(), "... ");

    repl.run_command_line("  return r * r * math.pi");
    assert_eq!(repl.prompt(), "... ");

    repl.run_command_line("end");
    assert_eq!(repl.prompt(), ">>> ");

    repl.run_command_line("area(2.0)");
    match repl.engine().value() {
        Value::Float(area) => assert!((area - 12.566370614359172).abs() < 1e-12),
        other => panic!("expected a float, got {other:?}"),
    }
}

#[test]
fn interrupt_returns_to_the_top_level_prompt() {
    let (mut repl, _) = repl();
    repl.run_command_line("function f(x)");
    assert_eq!(repl.prompt(), "... ");
    repl.interrupt();
    assert_eq!(repl.prompt(), ">>> ");
    assert!(!repl.engine().incomplete());
}

#[test]
fn pipeline_line_prints_the_final_value() {
    let (mut repl, out) = repl();
    assert!(repl.run_command_line("echo hi | cat"));
    assert_eq!(repl.engine().value(), &Value::Lines(vec!["hi".into()]));
    assert_eq!(out.contents(), "hi\n");
}

#[test]
fn failing_stage_abandons_the_line_and_reverts_the_prompt() {
    let (mut repl, _) = repl();
    assert!(!repl.run_command_line("6 | exit 3 | cat"));
    assert_eq!(repl.prompt(), ">>> ");
    assert!(!repl.engine().in_pipeline());
}

#[test]
fn undo_special_restores_the_previous_value() {
    let (mut repl, _) = repl();
    repl.run_command_line("6");
    repl.run_command_line("7");
    assert!(repl.run_command_line("%u"));
    assert_eq!(repl.engine().value(), &Value::Int(6));
}

#[test]
fn debug_special_toggles_tracing() {
    let (mut repl, _) = repl();
    assert!(!repl.engine().debug_enabled());
    repl.run_command_line("%d");
    assert!(repl.engine().debug_enabled());
    repl.run_command_line("%d");
    assert!(!repl.engine().debug_enabled());
}

#[test]
fn trace_special_implies_debug() {
    let (mut repl, _) = repl();
    repl.run_command_line("%t");
    assert!(repl.engine().error_traces_enabled());
    assert!(repl.engine().debug_enabled());
}

#[test]
fn underscore_reprints_the_current_value() {
    let (mut repl, out) = repl();
    repl.run_command_line("42");
    let after_run = out.contents();
    repl.run_command_line("_");
    let after_reprint = out.contents();
    assert_eq!(after_reprint, format!("{after_run}42\n"));
}

#[test]
fn cd_special_changes_directory_and_spares_the_value() {
    let (mut repl, _) = repl();
    let original = std::env::current_dir().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().canonicalize().unwrap();

    repl.run_command_line("6");
    assert!(repl.run_command_line(&format!("%cd {}", target.display())));
    assert_eq!(std::env::current_dir().unwrap(), target);
    assert_eq!(repl.engine().value(), &Value::Int(6));

    assert!(repl.run_command_line(&format!("%cd {}", original.display())));
}

#[test]
fn cd_special_reports_a_missing_directory_without_state_change() {
    let (mut repl, _) = repl();
    repl.run_command_line("6");
    // The special is handled (the line goes on) even though the target is bad.
    assert!(repl.run_command_line("%cd /nonexistent/kelp-nowhere"));
    assert_eq!(repl.engine().value(), &Value::Int(6));
}

#[test]
fn reload_special_without_an_init_file_is_harmless() {
    let (mut repl, _) = repl();
    repl.run_command_line("6");
    assert!(repl.run_command_line("%r"));
    assert_eq!(repl.engine().value(), &Value::Int(6));
}

#[test]
fn defined_helpers_join_the_pipeline() {
    let (mut repl, _) = repl();
    repl.run_command_line("function double(x) return x * 2 end");
    repl.run_command_line("21");
    repl.run_command_line("double(_)");
    assert_eq!(repl.engine().value(), &Value::Int(42));
}

#[test]
fn comment_lines_leave_the_value_alone() {
    let (mut repl, _) = repl();
    repl.run_command_line("6");
    assert!(repl.run_command_line("-- just a note"));
    assert_eq!(repl.engine().value(), &Value::Int(6));
}
