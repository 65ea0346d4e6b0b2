//! Session driver over in-memory streams and a scripted runner process.

use std::io::Cursor;
use std::path::Path;

use cukebridge_core::{Correlator, RecordingSink, RunContext, SinkEvent, TestNode, TestTree};
use cukebridge_runner::{AttachRequest, DebugHandshake, RunnerSettings, run_session, spawn_run};
use serde_json::{Value, json};

const DOC: &str = "features/login.feature";
const SCENARIO: &str = "features/login.feature/1";
const STEP: &str = "features/login.feature/1/2";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn tree(root: &Path) -> TestTree {
    let file = root.join(DOC);
    TestTree::new(vec![
        TestNode::new(DOC).with_source(&file, 0).with_child(
            TestNode::new(SCENARIO)
                .with_source(&file, 1)
                .with_child(TestNode::new(STEP).with_source(&file, 2)),
        ),
    ])
}

fn envelopes(status: &str, finish_run: bool) -> Vec<Value> {
    let mut lines = vec![
        json!({ "gherkinDocument": { "uri": DOC, "feature": { "name": "Login", "children": [
            { "scenario": {
                "id": "sc", "location": { "line": 2 }, "name": "ok",
                "steps": [{ "id": "st", "location": { "line": 3 }, "keywordType": "Context", "text": "a user" }],
            }},
        ]}}}),
        json!({ "pickle": { "id": "p", "uri": DOC, "astNodeIds": ["sc"],
            "steps": [{ "id": "ps", "astNodeIds": ["st"] }] } }),
        json!({ "testRunStarted": {} }),
        json!({ "testCase": { "id": "tc", "pickleId": "p",
            "testSteps": [{ "id": "ts", "pickleStepId": "ps" }] } }),
        json!({ "testCaseStarted": { "id": "tcs", "testCaseId": "tc" } }),
        json!({ "testStepFinished": { "testCaseStartedId": "tcs", "testStepId": "ts",
            "testStepResult": { "status": status, "duration": { "seconds": 1, "nanos": 500_000_000 } } } }),
        json!({ "testCaseFinished": { "testCaseStartedId": "tcs" } }),
    ];
    if finish_run {
        lines.push(json!({ "testRunFinished": { "success": status == "PASSED" } }));
    }
    lines
}

fn ndjson(lines: &[Value]) -> String {
    lines
        .iter()
        .map(|line| format!("{line}\n"))
        .collect::<String>()
}

fn correlator() -> Correlator {
    Correlator::new(tree(Path::new("/work")), RunContext::new("/work", ""))
}

// ---------------------------------------------------------------------------
// run_session
// ---------------------------------------------------------------------------

#[test]
fn stdout_drives_verdicts_and_run_ends_once() {
    let mut correlator = correlator();
    let mut sink = RecordingSink::new();
    let stdout = format!("Loading steps...\n{}", ndjson(&envelopes("PASSED", true)));
    let report = run_session(
        &mut correlator,
        Cursor::new(stdout),
        Cursor::new("deprecation warning\n"),
        &mut sink,
        None,
    )
    .unwrap();

    assert!(report.any_test_case_started);
    assert_eq!(report.pre_result_errors_reported, 0);
    assert_eq!(report.stderr_lines, vec!["deprecation warning"]);
    assert_eq!(
        sink.verdicts_for(STEP),
        vec![&SinkEvent::Passed {
            node: STEP.to_owned(),
            duration_ms: Some(1500.0),
        }]
    );
    assert!(sink.events().contains(&SinkEvent::Console {
        text: "Loading steps...".to_owned(),
    }));
    assert_eq!(sink.end_count(), 1);
}

#[test]
fn missing_run_finished_still_ends_the_run() {
    let mut correlator = correlator();
    let mut sink = RecordingSink::new();
    run_session(
        &mut correlator,
        Cursor::new(ndjson(&envelopes("FAILED", false))),
        Cursor::new(""),
        &mut sink,
        None,
    )
    .unwrap();
    assert!(matches!(
        sink.verdicts_for(SCENARIO).as_slice(),
        [SinkEvent::Failed { .. }]
    ));
    assert_eq!(sink.end_count(), 1);
    assert!(matches!(sink.events().last(), Some(SinkEvent::End)));
}

#[test]
fn stderr_before_any_test_case_errors_top_level_nodes() {
    let mut correlator = correlator();
    let mut sink = RecordingSink::new();
    let report = run_session(
        &mut correlator,
        Cursor::new(""),
        Cursor::new("Error: Cannot find module './steps'\n    at require\n"),
        &mut sink,
        None,
    )
    .unwrap();

    assert!(!report.any_test_case_started);
    assert_eq!(report.pre_result_errors_reported, 1);
    let events = sink.events();
    let SinkEvent::Errored { node, failure, .. } = &events[0] else {
        panic!("case=pre_result got {events:?}");
    };
    assert_eq!(node, DOC);
    assert_eq!(failure.message, "Error: Cannot find module './steps'\nat require");
    assert_eq!(sink.end_count(), 1);
}

#[test]
fn unknown_status_aborts_after_draining() {
    let mut correlator = correlator();
    let mut sink = RecordingSink::new();
    let mut lines = envelopes("EXPLODED", true);
    lines.push(json!({ "testRunFinished": {} }));
    let err = run_session(
        &mut correlator,
        Cursor::new(ndjson(&lines)),
        Cursor::new(""),
        &mut sink,
        None,
    )
    .unwrap_err();

    assert!(err.is_fatal_protocol_violation(), "case=fatal got {err}");
    assert!(sink.verdicts_for(STEP).is_empty());
    assert!(sink.verdicts_for(SCENARIO).is_empty());
    assert_eq!(sink.end_count(), 1, "case=end_after_abort");
}

#[test]
fn debug_banner_triggers_attach() {
    let mut correlator = correlator();
    let mut sink = RecordingSink::new();
    let mut requests = Vec::new();
    let mut attach = |request: &AttachRequest| requests.push(request.address.clone());
    let handshake = DebugHandshake::new(&mut attach, Path::new("/work"));
    let report = run_session(
        &mut correlator,
        Cursor::new(ndjson(&envelopes("PASSED", true))),
        Cursor::new("Debugger listening on ws://127.0.0.1:9229/abc\nFor help, see docs\n"),
        &mut sink,
        Some(handshake),
    )
    .unwrap();
    assert_eq!(requests, vec!["127.0.0.1:9229/abc"]);
    assert_eq!(report.stderr_lines, vec!["For help, see docs"]);
}

#[test]
fn debug_run_without_banner_still_reports_stderr() {
    let mut correlator = correlator();
    let mut sink = RecordingSink::new();
    let mut requests = 0;
    let mut attach = |_: &AttachRequest| requests += 1;
    let handshake = DebugHandshake::new(&mut attach, Path::new("/work"));
    let report = run_session(
        &mut correlator,
        Cursor::new(""),
        Cursor::new("Starting inspector on 127.0.0.1:9229 failed: address already in use\n"),
        &mut sink,
        Some(handshake),
    )
    .unwrap();

    assert_eq!(requests, 0);
    assert_eq!(report.pre_result_errors_reported, 1, "case=no_banner");
    assert!(matches!(
        sink.events().first(),
        Some(SinkEvent::Errored { node, .. }) if node == DOC
    ));
}

// ---------------------------------------------------------------------------
// spawn_run
// ---------------------------------------------------------------------------

#[cfg(unix)]
#[test]
fn spawned_runner_is_correlated_and_exit_code_reported() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = dir.path();
    std::fs::write(workspace.join("run.ndjson"), ndjson(&envelopes("FAILED", true))).unwrap();
    std::fs::write(
        workspace.join("runner.sh"),
        "echo \"$@\" > args.txt\ncat run.ndjson\necho 'late warning' >&2\nexit 3\n",
    )
    .unwrap();

    let settings = RunnerSettings::from_json(
        &json!({ "node": "sh", "runnerScript": "runner.sh", "profile": "ci" }).to_string(),
    )
    .unwrap();
    let mut sink = RecordingSink::new();
    let outcome = spawn_run(&settings, workspace, tree(workspace), &mut sink, None).unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.exit_code, Some(3));
    assert!(matches!(
        sink.verdicts_for(STEP).as_slice(),
        [SinkEvent::Failed { .. }]
    ));
    assert_eq!(sink.end_count(), 1);

    let args = std::fs::read_to_string(workspace.join("args.txt")).unwrap();
    let selection = format!("{}:1", workspace.join(DOC).display());
    assert_eq!(
        args.trim(),
        format!("{selection} --format message --profile ci")
    );
}

#[test]
fn missing_program_is_a_spawn_error() {
    let dir = tempfile::tempdir().unwrap();
    let settings =
        RunnerSettings::from_json(r#"{"node":"cukebridge-no-such-interpreter"}"#).unwrap();
    let mut sink = RecordingSink::new();
    let err = spawn_run(&settings, dir.path(), tree(dir.path()), &mut sink, None).unwrap_err();
    assert!(
        err.to_string().contains("cukebridge-no-such-interpreter"),
        "case=spawn got {err}"
    );
    assert!(sink.events().is_empty());
}
