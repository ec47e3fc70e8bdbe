//! End-to-end dispatch tests that spawn real external processes.
//!
//! These drive the engine the way the front end does: one line is split into
//! stages and each stage is dispatched with its 1-based position.

use kelp_engine::{split_command_line, Engine, EngineError, ProcessError};
use kelp_testutil::test_engine;
use kelp_types::Value;

/// Split a line and run every stage, returning the last outcome.
fn run_line(engine: &mut Engine, line: &str) -> Result<bool, EngineError> {
    let commands = split_command_line(line);
    let total = commands.len();
    let mut printed = false;
    for (i, command) in commands.iter().enumerate() {
        let outcome = engine.run(command, i + 1, total)?;
        printed = outcome.should_print;
    }
    Ok(printed)
}

#[test]
fn two_stage_line_pipes_process_output() {
    let (mut engine, out, _) = test_engine();
    let printed = run_line(&mut engine, "echo hi | cat").unwrap();
    assert_eq!(engine.value(), &Value::Lines(vec!["hi".into()]));
    assert!(printed);
    engine.print().unwrap();
    assert_eq!(out.contents(), "hi\n");
}

#[test]
fn value_threads_through_expressions_across_lines() {
    let (mut engine, _, _) = test_engine();
    run_line(&mut engine, "-6").unwrap();
    assert_eq!(engine.value(), &Value::Int(-6));
    run_line(&mut engine, "math.abs(_)").unwrap();
    assert_eq!(engine.value(), &Value::Int(6));
    run_line(&mut engine, "_ * 7").unwrap();
    assert_eq!(engine.value(), &Value::Int(42));
}

#[test]
fn escaped_separator_reaches_the_shell_as_one_stage() {
    let (mut engine, _, _) = test_engine();
    run_line(&mut engine, r"echo hi \| wc -c").unwrap();
    match engine.value() {
        Value::Lines(lines) => {
            assert_eq!(lines.len(), 1);
            // "hi\n" is three bytes.
            assert_eq!(lines[0].trim(), "3");
        }
        other => panic!("expected lines, got {other:?}"),
    }
}

#[test]
fn expression_value_pipes_into_a_process_stage() {
    let (mut engine, _, _) = test_engine();
    run_line(&mut engine, r#""a\nb\nc" | grep b"#).unwrap();
    assert_eq!(engine.value(), &Value::Lines(vec!["b".into()]));
}

#[test]
fn process_output_pipes_into_an_expression_stage() {
    let (mut engine, _, _) = test_engine();
    run_line(&mut engine, "printf 'x\\ny\\n' | #_").unwrap();
    assert_eq!(engine.value(), &Value::Int(2));
}

#[test]
fn bare_word_runs_as_a_process() {
    let (mut engine, _, _) = test_engine();
    let printed = run_line(&mut engine, "uname").unwrap();
    match engine.value() {
        Value::Lines(lines) => assert!(!lines.is_empty()),
        other => panic!("expected lines, got {other:?}"),
    }
    assert!(printed);
    // Crucially, it was not buffered as an incomplete statement.
    assert!(!engine.incomplete());
}

#[test]
fn first_stage_of_a_fresh_line_gets_no_piped_input() {
    let (mut engine, _, _) = test_engine();
    run_line(&mut engine, "6").unwrap();
    // `cat` would hang waiting on stdin if the previous value were piped in
    // outside a pipeline chain; `echo` ignores stdin either way.
    run_line(&mut engine, "echo fresh").unwrap();
    assert_eq!(engine.value(), &Value::Lines(vec!["fresh".into()]));
}

#[test]
fn failing_middle_stage_reports_and_closes_the_chain() {
    let (mut engine, _, _) = test_engine();
    let commands = split_command_line("6 | exit 7 | cat");
    assert_eq!(commands.len(), 3);

    engine.run(&commands[0], 1, 3).unwrap();
    let error = engine.run(&commands[1], 2, 3).unwrap_err();
    match error {
        EngineError::Process(ProcessError::Failed { status, .. }) => assert_eq!(status, 7),
        other => panic!("expected process failure, got {other:?}"),
    }
    // The implicit reset closed the chain and cleared the register.
    assert!(!engine.in_pipeline());
    assert_eq!(engine.value(), &Value::Absent);
}

#[test]
fn empty_process_output_yields_an_empty_sequence() {
    let (mut engine, _, _) = test_engine();
    let printed = run_line(&mut engine, "true").unwrap();
    // `true` the Lua keyword wins over the command; use a silent command.
    assert!(printed);

    let printed = run_line(&mut engine, "printf ''").unwrap();
    assert_eq!(engine.value(), &Value::Lines(Vec::new()));
    assert!(!printed);
}

#[test]
fn statement_runtime_error_degrades_into_a_shell_attempt() {
    let (mut engine, _, _) = test_engine();
    // Compiles as a Lua call statement, raises on the unknown name, falls
    // through to the shell, and fails there too.
    let error = run_line(&mut engine, "frobnicate(1)").unwrap_err();
    assert!(matches!(
        error,
        EngineError::Process(ProcessError::Failed { .. })
    ));
}

#[test]
fn trailing_separator_pipes_into_the_next_line() {
    let (mut engine, _, _) = test_engine();
    run_line(&mut engine, r#""one\ntwo" |"#).unwrap();
    assert!(engine.in_pipeline());
    run_line(&mut engine, "wc -l").unwrap();
    match engine.value() {
        Value::Lines(lines) => assert_eq!(lines[0].trim(), "2"),
        other => panic!("expected lines, got {other:?}"),
    }
}

#[test]
fn change_directory_moves_the_process_and_spares_the_register() {
    let (mut engine, _, _) = test_engine();
    let original = std::env::current_dir().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().canonicalize().unwrap();

    run_line(&mut engine, "6").unwrap();
    engine.change_directory(&target).unwrap();
    assert_eq!(std::env::current_dir().unwrap(), target);
    assert_eq!(engine.value(), &Value::Int(6));

    engine.change_directory(&original).unwrap();
}

#[test]
fn change_directory_to_a_missing_path_is_reported() {
    let (engine, _, _) = test_engine();
    let error = engine
        .change_directory(std::path::Path::new("/nonexistent/kelp-nowhere"))
        .unwrap_err();
    assert!(matches!(error, EngineError::NoSuchDirectory(_)));
}
