mod support;

use runwright::config::EngineConfig;
use runwright::orchestration::{EngineError, ExecutionAgentKind, PlanRunEngine};
use runwright::output::{Output, OutputKind};
use runwright::plan::{Plan, PlanInput, Step};
use runwright::plan_run::PlanRunState;
use runwright::store::InMemoryStorage;
use runwright::tool::LLM_TOOL_ID;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use support::{
    echo_output, memory_engine, ready_tools, three_step_plan, FlagTool, RecordingHooks,
    ScriptedAgents,
};

#[test]
fn resume_module_runs_every_step_once_and_completes() {
    let agents = ScriptedAgents::echo();
    let engine = memory_engine(ready_tools(), agents.clone());
    let plan = three_step_plan();

    let run = engine
        .run_plan(&plan, None, BTreeMap::new())
        .expect("run plan");

    assert_eq!(run.state, PlanRunState::Complete);
    assert_eq!(agents.calls(), 3);
    assert_eq!(run.outputs.step_outputs.len(), 3);
    assert_eq!(run.end_user_id, "default_user");

    let final_output = run.outputs.final_output.as_ref().expect("final output");
    assert_eq!(
        final_output.raw_value(),
        Some(&json!({ "index": 2, "task": "send the digest" }))
    );

    let stored = engine
        .storage()
        .get_plan_run(&run.id)
        .expect("load stored run");
    assert_eq!(stored, run);
}

#[test]
fn resume_module_rejects_terminal_runs() {
    let agents = ScriptedAgents::echo();
    let engine = memory_engine(ready_tools(), agents.clone());
    let plan = three_step_plan();
    let completed = engine
        .run_plan(&plan, None, BTreeMap::new())
        .expect("run plan");

    let err = engine.resume(&completed.id).expect_err("complete run");
    assert!(err.is_programmer_error());
    assert!(matches!(
        err,
        EngineError::InvalidPlanRunState {
            state: PlanRunState::Complete,
            ..
        }
    ));

    let failing = memory_engine(ready_tools(), ScriptedAgents::failing_at(0));
    let failed = failing
        .run_plan(&plan, None, BTreeMap::new())
        .expect("run plan");
    assert_eq!(failed.state, PlanRunState::Failed);
    let err = failing.resume_run(failed).expect_err("failed run");
    assert!(matches!(
        err,
        EngineError::InvalidPlanRunState {
            state: PlanRunState::Failed,
            ..
        }
    ));
    assert_eq!(agents.calls(), 3);
}

#[test]
fn resume_module_fails_fast_and_records_the_error() {
    let agents = ScriptedAgents::failing_at(1);
    let hooks = Arc::new(RecordingHooks::new());
    let engine = memory_engine(ready_tools(), agents.clone()).with_hooks(hooks.clone());
    let plan = three_step_plan();

    let run = engine
        .run_plan(&plan, None, BTreeMap::new())
        .expect("failure is reported through state");

    assert_eq!(run.state, PlanRunState::Failed);
    assert_eq!(agents.calls(), 2);
    assert_eq!(agents.calls_for_step(2), 0);
    assert_eq!(run.current_step_index, 1);

    let error_output = run.step_output("$summary").expect("error output");
    assert_eq!(error_output.kind(), OutputKind::Error);
    assert_eq!(run.outputs.final_output.as_ref(), Some(error_output));
    assert_eq!(error_output.summary(), Some("boom at step 1"));
    assert!(run.step_output("$digest").is_none());

    assert_eq!(
        hooks.events(),
        vec![
            "before_run",
            "before_step:$mail",
            "after_step:$mail:value",
            "before_step:$summary",
            "after_step:$summary:error",
            "after_run:error",
        ]
    );
}

#[test]
fn resume_module_unregistered_tools() {
    let agents = ScriptedAgents::echo();
    let engine = memory_engine(ready_tools(), agents.clone());
    let plan = Plan::new(
        "use a tool nobody registered",
        vec![Step::new("do it", "$out").with_tool("ghost")],
    );
    engine.storage().save_plan(&plan).expect("save plan");

    let run = engine
        .create_plan_run(&plan, None, BTreeMap::new())
        .expect("create run");
    let err = engine
        .resume_run(run.clone())
        .expect_err("gate cannot resolve tool");
    assert!(matches!(err, EngineError::Tool(_)));
    assert!(err.to_string().contains("ghost"));

    let run = engine
        .execute_and_handle_clarifications(&plan, run)
        .expect("step failure is reported through state");
    assert_eq!(run.state, PlanRunState::Failed);
    assert_eq!(agents.calls(), 0);
    let output = run.step_output("$out").expect("error output");
    assert_eq!(output.kind(), OutputKind::Error);
}

#[test]
fn resume_module_pause_keeps_earlier_outputs_and_index() {
    let calendar = FlagTool::local("calendar", true);
    let calendar_in_agent = calendar.clone();
    let agents = ScriptedAgents::new(move |ctx| {
        match ctx.step_index {
            // Authorization lapses after the initial gate has passed.
            0 => calendar_in_agent.set_ready(false),
            1 if !calendar_in_agent.is_ready() => {
                return Ok(Output::clarification(
                    calendar_in_agent.authorization_clarification(ctx.plan_run),
                ));
            }
            _ => {}
        }
        Ok(echo_output(ctx))
    });
    let tools = ready_tools().with_tool(calendar.clone());
    let engine = memory_engine(tools, agents.clone());
    let plan = three_step_plan();

    let run = engine
        .run_plan(&plan, Some("ada"), BTreeMap::new())
        .expect("run plan");
    assert_eq!(run.state, PlanRunState::NeedClarification);
    assert_eq!(run.current_step_index, 1);
    let mail_output = run.step_output("$mail").cloned().expect("mail output");

    let stored = engine.storage().get_plan_run(&run.id).expect("stored run");
    assert_eq!(stored.current_step_index, 1);
    assert_eq!(stored.outputs.clarifications.len(), 1);
    assert_eq!(stored.outputs.clarifications[0].step, Some(1));

    let clarification = stored.outputs.clarifications[0].clone();
    let ready = engine
        .resolve_clarification(&clarification, json!("done"))
        .expect("resolve");
    assert_eq!(ready.state, PlanRunState::ReadyToResume);

    calendar.set_ready(true);
    let done = engine.resume(&run.id).expect("resume");
    assert_eq!(done.state, PlanRunState::Complete);
    assert_eq!(agents.calls_for_step(0), 1);
    assert_eq!(agents.calls_for_step(1), 2);
    assert_eq!(agents.calls_for_step(2), 1);
    assert_eq!(done.step_output("$mail"), Some(&mail_output));
}

#[test]
fn resume_module_before_step_hook_bypass_records_nothing() {
    let agents = ScriptedAgents::echo();
    let hooks = Arc::new(RecordingHooks::new().bypassing("$summary"));
    let engine = memory_engine(ready_tools(), agents.clone()).with_hooks(hooks.clone());

    let run = engine
        .run_plan(&three_step_plan(), None, BTreeMap::new())
        .expect("run plan");

    assert_eq!(run.state, PlanRunState::Complete);
    assert_eq!(agents.calls(), 2);
    assert!(run.step_output("$summary").is_none());
    assert_eq!(
        hooks.events().last().map(String::as_str),
        Some("after_run:value")
    );
}

#[test]
fn resume_module_validates_plan_inputs() {
    let engine = memory_engine(ready_tools(), ScriptedAgents::echo());
    let plan = three_step_plan().with_inputs(vec![PlanInput::new("mailbox")]);

    let err = engine
        .create_plan_run(&plan, None, BTreeMap::new())
        .expect_err("missing input");
    match err {
        EngineError::MissingPlanInputs { missing, .. } => {
            assert_eq!(missing, vec!["mailbox".to_string()])
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let mut inputs = BTreeMap::new();
    inputs.insert("mailbox".to_string(), json!("inbox"));
    inputs.insert("unexpected".to_string(), json!(1));
    let run = engine
        .create_plan_run(&plan, Some("grace"), inputs)
        .expect("create run");
    assert_eq!(run.state, PlanRunState::NotStarted);
    assert_eq!(run.plan_run_inputs.len(), 1);
    assert_eq!(run.plan_run_inputs.get("mailbox"), Some(&json!("inbox")));
    assert_eq!(run.end_user_id, "grace");
}

#[test]
fn resume_module_runs_stored_plans_by_id() {
    let agents = ScriptedAgents::echo();
    let engine = memory_engine(ready_tools(), agents.clone());
    let plan = three_step_plan();
    engine.storage().save_plan(&plan).expect("save plan");

    let run = engine
        .run_plan_by_id(&plan.id, None, BTreeMap::new())
        .expect("run by id");
    assert_eq!(run.plan_id, plan.id);
    assert_eq!(run.state, PlanRunState::Complete);

    let unknown = runwright::PlanId::generate();
    let err = engine
        .run_plan_by_id(&unknown, None, BTreeMap::new())
        .expect_err("unknown plan");
    assert!(err.is_programmer_error());
}

#[test]
fn resume_module_llm_tool_forces_one_shot_agent() {
    let agents = ScriptedAgents::echo();
    let engine = memory_engine(ready_tools(), agents.clone());
    let plan = Plan::new(
        "mixed",
        vec![
            Step::new("answer directly", "$answer").with_tool(LLM_TOOL_ID),
            Step::new("fetch", "$mail").with_tool("mail"),
        ],
    );

    let run = engine
        .run_plan(&plan, None, BTreeMap::new())
        .expect("run plan");
    assert_eq!(run.state, PlanRunState::Complete);
    assert_eq!(
        agents.kinds(),
        vec![ExecutionAgentKind::OneShot, ExecutionAgentKind::Default]
    );
}

#[test]
fn resume_module_offloads_large_outputs() {
    let agents = ScriptedAgents::new(|ctx| {
        if ctx.step_index == 0 {
            Ok(Output::value("x".repeat(256)))
        } else {
            Ok(Output::value("small"))
        }
    });
    let config = EngineConfig {
        large_output_threshold_bytes: 64,
        ..EngineConfig::default()
    };
    let engine = PlanRunEngine::new(
        config,
        Arc::new(InMemoryStorage::new()),
        ready_tools(),
        agents,
    );
    let plan = Plan::new(
        "big then small",
        vec![
            Step::new("big", "$big").with_tool("mail"),
            Step::new("small", "$small").with_tool("sender"),
        ],
    );

    let run = engine
        .run_plan(&plan, None, BTreeMap::new())
        .expect("run plan");
    let big = run.step_output("$big").expect("big output");
    let small = run.step_output("$small").expect("small output");
    assert!(big.is_offloaded());
    assert!(!small.is_offloaded());
    assert_eq!(big.kind(), OutputKind::Value);

    let runwright::output::Output::Offloaded(reference) = big else {
        panic!("expected an offloaded reference");
    };
    let loaded = engine
        .storage()
        .get_large_output(reference)
        .expect("load large output");
    assert_eq!(loaded.raw_value(), Some(&json!("x".repeat(256))));
}

#[test]
fn resume_module_interrupt_fails_the_run() {
    let agents = ScriptedAgents::echo();
    let engine = memory_engine(ready_tools(), agents.clone());
    let interrupt = engine.interrupt_handle();
    interrupt.store(true, Ordering::SeqCst);

    let run = engine
        .run_plan(&three_step_plan(), None, BTreeMap::new())
        .expect("interrupt is not an error");

    assert_eq!(run.state, PlanRunState::Failed);
    assert_eq!(agents.calls(), 0);
    let stored = engine.storage().get_plan_run(&run.id).expect("stored run");
    assert_eq!(stored.state, PlanRunState::Failed);
}

#[test]
fn resume_module_drives_independent_runs_concurrently() {
    let agents = ScriptedAgents::echo();
    let engine = memory_engine(ready_tools(), agents.clone());
    let plan = three_step_plan();
    engine.storage().save_plan(&plan).expect("save plan");

    let engine = &engine;
    let plan_id = &plan.id;
    let runs: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                scope.spawn(move || {
                    engine
                        .run_plan_by_id(plan_id, None, BTreeMap::new())
                        .expect("run plan")
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("join"))
            .collect()
    });

    assert_eq!(agents.calls(), 12);
    for run in &runs {
        assert_eq!(run.state, PlanRunState::Complete);
        assert_eq!(run.outputs.step_outputs.len(), 3);
    }
    let mut ids: Vec<_> = runs.iter().map(|run| run.id.clone()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 4);
}
