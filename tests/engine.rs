#![cfg(unix)]

mod common;

use std::{
    fs,
    sync::{Arc, Mutex},
    time::Duration,
};

use futures::FutureExt;
use nodeflow::{ChannelEvent, ChannelOptions, EdgeModel, GraphEvent, NodeEvent, NodeflowError, Severity, Vars};
use serde_json::json;

use common::{Bundles, result_line};

fn init_manifest() -> serde_json::Value {
    json!({
        "type": "流",
        "parameters": {
            "outputs": [{"type": "number", "name": "x"}, {"type": "number", "name": "y"}]
        }
    })
}

fn calc_manifest() -> serde_json::Value {
    json!({
        "type": "流",
        "parameters": {
            "inputs": [
                {"type": "number", "name": "a", "default_value": 5},
                {"type": "number", "name": "b", "default_value": 0}
            ],
            "outputs": [{"type": "number", "name": "sum"}]
        },
        "config": [{"name": "label", "type": "text", "default_value": "calc"}]
    })
}

fn task_manifest() -> serde_json::Value {
    json!({
        "type": "任务",
        "parameters": {
            "outputs": [{"type": "boolean", "name": "done"}]
        }
    })
}

fn calc_script() -> String {
    let result = format!(r#"echo "{} {{\"outputs\": {{\"sum\": $((IN_a + IN_b))}}}}" >&2"#, nodeflow::RESULT_PREFIX);
    format!("echo \"$CFG_label adding\"\n{}\n", result)
}

fn scratch_files(bundles: &Bundles) -> usize {
    let scratch = bundles.path().join(".scratch");
    if !scratch.exists() {
        return 0;
    }
    fs::read_dir(scratch).unwrap().count()
}

async fn wait_until(
    timeout: Duration,
    mut f: impl FnMut() -> bool,
) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if f() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    f()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_outputs_propagate_along_edges() {
    let bundles = Bundles::new();
    let init = bundles.add("init", init_manifest(), &format!("echo 'init running'\n{}", result_line(r#"{"x": 3, "y": 4}"#)));
    let calc = bundles.add("calc", calc_manifest(), &calc_script());
    let engine = bundles.engine();

    let edges = vec![EdgeModel::new("init", "output-0", "calc", "input-0"), EdgeModel::new("init", "output-1", "calc", "input-1")];
    let report = engine.start(vec![calc.instantiate("calc"), init.instantiate("init")], edges).await.unwrap();

    assert_eq!(report.order, vec!["init", "calc"]);
    assert_eq!(report.outputs["calc"], Vars::from(json!({"sum": 7})));
    assert!(!report.stopped);

    let calc = engine.nodes().into_iter().find(|n| n.id == "calc").unwrap();
    assert_eq!(calc.outputs[0].value, Some(json!(7)));
    assert!(!engine.is_running());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unconnected_inputs_use_defaults() {
    let bundles = Bundles::new();
    let calc = bundles.add("calc", calc_manifest(), &calc_script());
    let engine = bundles.engine();

    let report = engine.start(vec![calc.instantiate("calc")], vec![]).await.unwrap();
    assert_eq!(report.outputs["calc"], Vars::from(json!({"sum": 5})));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_node_output_is_streamed_as_logs() {
    let bundles = Bundles::new();
    let calc = bundles.add("calc", calc_manifest(), &calc_script());
    let engine = bundles.engine();

    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink = lines.clone();
    ChannelEvent::channel(engine.channel(), ChannelOptions::with_nid("calc".to_string())).on_log(move |log| {
        sink.lock().unwrap().push((log.severity, log.content.clone()));
    });

    engine.start(vec![calc.instantiate("calc")], vec![]).await.unwrap();

    assert!(wait_until(Duration::from_secs(2), || !lines.lock().unwrap().is_empty()).await);
    let lines = lines.lock().unwrap();
    assert!(lines.contains(&(Severity::Info, "calc adding".to_string())));
    assert!(lines.iter().all(|(_, line)| !line.contains(nodeflow::RESULT_PREFIX)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_lone_task_node() {
    let bundles = Bundles::new();
    let task = bundles.add("lone", task_manifest(), &result_line(r#"{"done": true}"#));
    let engine = bundles.engine();

    let report = engine.start(vec![task.instantiate("lone")], vec![]).await.unwrap();
    assert!(report.order.is_empty());
    assert_eq!(report.tasks, vec!["lone"]);

    let finished = wait_until(Duration::from_secs(5), || {
        engine.nodes().iter().any(|n| n.id == "lone" && n.outputs[0].value == Some(json!(true)))
    })
    .await;
    assert!(finished);
    assert!(wait_until(Duration::from_secs(2), || !engine.is_running()).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failing_task_does_not_fail_the_flow() {
    let bundles = Bundles::new();
    let broken = bundles.add("broken", task_manifest(), "echo 'task blew up' >&2\nexit 3\n");
    let init = bundles.add("init", init_manifest(), &result_line(r#"{"x": 1, "y": 2}"#));
    let engine = bundles.engine();

    let report = engine.start(vec![broken.instantiate("broken"), init.instantiate("init")], vec![]).await.unwrap();
    assert_eq!(report.order, vec!["init"]);

    // a failed task stays tracked until stopped
    assert!(wait_until(Duration::from_secs(5), || engine.node_status("broken").is_some_and(|s| s.state == "Error")).await);
    assert_eq!(engine.running_node_ids(), vec!["broken"]);

    engine.force_stop();
    assert!(!engine.is_running());
    assert!(engine.registry().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_flow_failure_carries_exit_code_and_stderr() {
    let bundles = Bundles::new();
    let init = bundles.add("init", init_manifest(), "echo 'boom' >&2\nexit 2\n");
    let calc = bundles.add("calc", calc_manifest(), &calc_script());
    let engine = bundles.engine();

    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = errors.clone();
    ChannelEvent::channel(engine.channel(), ChannelOptions::default()).on_log(move |log| {
        if log.severity == Severity::Error {
            sink.lock().unwrap().push(log.nid.clone());
        }
    });

    let edges = vec![EdgeModel::new("init", "output-0", "calc", "input-0")];
    let err = engine.start(vec![init.instantiate("init"), calc.instantiate("calc")], edges).await.unwrap_err();

    match err {
        NodeflowError::ProcessExecution {
            code,
            stderr,
            ..
        } => {
            assert_eq!(code, Some(2));
            assert!(stderr.contains("boom"));
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(engine.nodes().iter().find(|n| n.id == "calc").unwrap().outputs[0].value.is_none());
    assert!(!engine.is_running());

    // reported once, against the failing node
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(*errors.lock().unwrap(), vec!["init".to_string()]);
    assert_eq!(scratch_files(&bundles), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_missing_result_line() {
    let bundles = Bundles::new();
    let init = bundles.add("init", init_manifest(), "echo '{\"outputs\": {\"x\": 1}}'\n");
    let engine = bundles.engine();

    let err = engine.start(vec![init.instantiate("init")], vec![]).await.unwrap_err();
    assert!(matches!(err, NodeflowError::ResultParse { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_force_stop_kills_running_flow() {
    let bundles = Bundles::new();
    let sleeper = bundles.add("sleeper", init_manifest(), "exec sleep 30\n");
    let engine = Arc::new(bundles.engine());

    let mut state = engine.subscribe();
    let run = engine.launch(vec![sleeper.instantiate("sleeper")], vec![]);

    tokio::time::timeout(Duration::from_secs(5), state.wait_for(|s| s.is_running && s.node_ids == vec!["sleeper".to_string()])).await.unwrap().unwrap();
    assert!(engine.is_running());

    engine.force_stop();
    let report = tokio::time::timeout(Duration::from_secs(5), run).await.unwrap().unwrap().unwrap();
    assert!(report.stopped);
    assert!(!engine.is_running());
    tokio::time::timeout(Duration::from_secs(1), state.wait_for(|s| !s.is_running)).await.unwrap().unwrap();
    assert_eq!(scratch_files(&bundles), 0);

    // the next run starts with a clean stop flag
    let init = bundles.add("init", init_manifest(), &result_line(r#"{"x": 1, "y": 2}"#));
    let report = engine.start(vec![init.instantiate("init")], vec![]).await.unwrap();
    assert!(!report.stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_force_stop_kills_long_running_task() {
    let bundles = Bundles::new();
    let ticker = bundles.add("ticker", task_manifest(), "exec sleep 30\n");
    let engine = bundles.engine();

    engine.start(vec![ticker.instantiate("ticker")], vec![]).await.unwrap();
    assert!(wait_until(Duration::from_secs(5), || engine.is_running()).await);

    engine.stop();
    assert!(!engine.is_running());
    assert!(wait_until(Duration::from_secs(5), || engine.node_status("ticker").is_some_and(|s| s.state == "Stopped")).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_force_stop_when_idle_is_a_no_op() {
    let bundles = Bundles::new();
    let engine = bundles.engine();

    engine.force_stop();
    engine.force_stop();
    assert!(!engine.is_running());
    assert!(engine.running_node_ids().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_bundles_are_discovered() {
    let bundles = Bundles::new();
    bundles.add("calc", calc_manifest(), &calc_script());
    bundles.add("init", init_manifest(), "");
    let engine = bundles.engine();

    let names: Vec<String> = engine.bundles().unwrap().into_iter().map(|b| b.manifest.name).collect();
    assert_eq!(names, vec!["calc", "init"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_force_stop_right_after_start_kills_tasks() {
    let bundles = Bundles::new();
    let ticker = bundles.add("ticker", task_manifest(), "exec sleep 30\n");
    let engine = bundles.engine();

    engine.start(vec![ticker.instantiate("ticker")], vec![]).await.unwrap();
    engine.force_stop();

    assert!(wait_until(Duration::from_secs(5), || engine.node_status("ticker").is_some_and(|s| s.state == "Stopped")).await);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!engine.is_running());
    assert!(engine.running_node_ids().is_empty());
    assert_eq!(scratch_files(&bundles), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_channel_subscribers_see_the_run() {
    let bundles = Bundles::new();
    let calc = bundles.add("calc", calc_manifest(), &calc_script());
    let engine = bundles.engine();

    let completed = Arc::new(Mutex::new(Vec::new()));
    let events = Arc::new(Mutex::new(Vec::new()));
    let async_events = Arc::new(Mutex::new(Vec::new()));
    let async_logs = Arc::new(Mutex::new(Vec::new()));

    let all = ChannelEvent::channel(engine.channel(), ChannelOptions::default());
    let sink = completed.clone();
    all.on_complete(move |rid| sink.lock().unwrap().push(rid));

    let calc_only = ChannelEvent::channel(engine.channel(), ChannelOptions::with_nid("calc".to_string()));
    let sink = events.clone();
    calc_only.on_event(move |e| sink.lock().unwrap().push(e.event.clone()));
    let sink = async_events.clone();
    calc_only.on_event_async(move |e| {
        let sink = sink.clone();
        let nid = e.nid.clone();
        async move { sink.lock().unwrap().push(nid) }.boxed()
    });
    let sink = async_logs.clone();
    calc_only.on_log_async(move |log| {
        let sink = sink.clone();
        let content = log.content.clone();
        async move { sink.lock().unwrap().push(content) }.boxed()
    });

    let report = engine.start(vec![calc.instantiate("calc")], vec![]).await.unwrap();

    assert!(wait_until(Duration::from_secs(2), || !completed.lock().unwrap().is_empty()).await);
    assert_eq!(*completed.lock().unwrap(), vec![report.run_id.clone()]);

    assert!(wait_until(Duration::from_secs(2), || events.lock().unwrap().iter().any(|e| matches!(e, GraphEvent::Node(NodeEvent::Succeeded(_))))).await);
    assert!(events.lock().unwrap().iter().all(|e| matches!(e, GraphEvent::Node(_))));

    assert!(wait_until(Duration::from_secs(2), || async_events.lock().unwrap().len() >= 2).await);
    assert!(async_events.lock().unwrap().iter().all(|nid| nid == "calc"));
    assert!(wait_until(Duration::from_secs(2), || async_logs.lock().unwrap().contains(&"calc adding".to_string())).await);
}
