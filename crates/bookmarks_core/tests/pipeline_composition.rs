use bookmarks_core::{
    middleware_fn, ContinuationGuard, LoggingMiddleware, Middleware, Next, NoPipeline,
    OperationLogger, OperationRunner, Pipeline, PipelineError,
};
use log::Level;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
struct Payload {
    value: i64,
}

#[derive(Debug, PartialEq)]
enum TestError {
    Pipeline(PipelineError),
    Operation(&'static str),
}

impl From<PipelineError> for TestError {
    fn from(value: PipelineError) -> Self {
        Self::Pipeline(value)
    }
}

type PayloadNext<'a> = Next<'a, Payload, Payload, TestError>;

/// Appends `name` to a shared trail on the way in and on the way out.
struct TrailRecorder {
    name: &'static str,
    trail: Rc<RefCell<Vec<String>>>,
}

impl Middleware<Payload, Payload, TestError> for TrailRecorder {
    fn process(
        &self,
        data: Option<Payload>,
        next: &mut PayloadNext<'_>,
    ) -> Result<Option<Payload>, TestError> {
        self.trail.borrow_mut().push(format!("{}:in", self.name));
        let result = next.run(data);
        self.trail.borrow_mut().push(format!("{}:out", self.name));
        result
    }
}

#[derive(Default)]
struct RecordingLogger {
    entries: RefCell<Vec<(Level, String)>>,
}

impl OperationLogger for RecordingLogger {
    fn log(&self, level: Level, message: &str) {
        self.entries.borrow_mut().push((level, message.to_string()));
    }
}

fn increment(input: Option<Payload>) -> Result<Option<Payload>, TestError> {
    Ok(input.map(|payload| Payload {
        value: payload.value + 1,
    }))
}

fn add_five(input: Option<Payload>) -> Result<Option<Payload>, TestError> {
    Ok(input.map(|payload| Payload {
        value: payload.value + 5,
    }))
}

fn recorder(name: &'static str, trail: &Rc<RefCell<Vec<String>>>) -> Rc<TrailRecorder> {
    Rc::new(TrailRecorder {
        name,
        trail: Rc::clone(trail),
    })
}

#[test]
fn first_middleware_is_outermost_and_unwinds_last() {
    let trail = Rc::new(RefCell::new(Vec::new()));
    let pipeline = Pipeline::new()
        .with_middleware(recorder("m1", &trail))
        .with_middleware(recorder("m2", &trail))
        .with_middleware(recorder("m3", &trail));

    pipeline.run(increment, Some(Payload { value: 0 })).unwrap();
    assert_eq!(
        *trail.borrow(),
        vec!["m1:in", "m2:in", "m3:in", "m3:out", "m2:out", "m1:out"]
    );
}

#[test]
fn pre_call_mutations_chain_into_operation() {
    let add_ten = middleware_fn(|data: Option<Payload>, next: &mut PayloadNext<'_>| {
        next.run(data.map(|p| Payload { value: p.value + 10 }))
    });
    let double = middleware_fn(|data: Option<Payload>, next: &mut PayloadNext<'_>| {
        next.run(data.map(|p| Payload { value: p.value * 2 }))
    });
    let pipeline = Pipeline::new()
        .with_middleware(Rc::new(add_ten))
        .with_middleware(Rc::new(double));

    let result = pipeline.run(add_five, Some(Payload { value: 0 })).unwrap();
    assert_eq!(result, Some(Payload { value: 25 }));
}

#[test]
fn post_call_mutations_apply_in_reverse_declaration_order() {
    let add_ten = middleware_fn(|data: Option<Payload>, next: &mut PayloadNext<'_>| {
        let result = next.run(data)?;
        Ok(result.map(|p| Payload { value: p.value + 10 }))
    });
    let double = middleware_fn(|data: Option<Payload>, next: &mut PayloadNext<'_>| {
        let result = next.run(data)?;
        Ok(result.map(|p| Payload { value: p.value * 2 }))
    });
    let pipeline = Pipeline::new()
        .with_middleware(Rc::new(add_ten))
        .with_middleware(Rc::new(double));

    // (0 + 5) * 2 + 10: the inner layer transforms the result first.
    let result = pipeline.run(add_five, Some(Payload { value: 0 })).unwrap();
    assert_eq!(result, Some(Payload { value: 20 }));
}

#[test]
fn identity_runners_match_direct_operation_call() {
    for input in [None, Some(Payload { value: -3 }), Some(Payload { value: 41 })] {
        let direct = increment(input.clone()).unwrap();
        assert_eq!(NoPipeline.run(increment, input.clone()).unwrap(), direct);
        assert_eq!(
            Pipeline::<Payload, Payload, TestError>::new()
                .run(increment, input)
                .unwrap(),
            direct
        );
    }
}

#[test]
fn identity_runners_propagate_operation_errors() {
    let failing = |_: Option<Payload>| -> Result<Option<Payload>, TestError> {
        Err(TestError::Operation("boom"))
    };
    assert_eq!(
        NoPipeline.run(failing, None).unwrap_err(),
        TestError::Operation("boom")
    );
    assert_eq!(
        Pipeline::new().run(failing, None).unwrap_err(),
        TestError::Operation("boom")
    );
}

#[test]
fn with_middleware_leaves_base_pipeline_unchanged() {
    let trail = Rc::new(RefCell::new(Vec::new()));
    let base = Pipeline::new().with_middleware(recorder("base", &trail));
    let extended = base.with_middleware(recorder("tail", &trail));
    assert_eq!(base.len(), 1);
    assert_eq!(extended.len(), 2);

    base.run(increment, Some(Payload { value: 1 })).unwrap();
    assert_eq!(*trail.borrow(), vec!["base:in", "base:out"]);

    trail.borrow_mut().clear();
    extended.run(increment, Some(Payload { value: 1 })).unwrap();
    assert_eq!(
        *trail.borrow(),
        vec!["base:in", "tail:in", "tail:out", "base:out"]
    );
}

#[test]
fn same_middleware_instance_may_appear_twice() {
    let trail = Rc::new(RefCell::new(Vec::new()));
    let shared = recorder("shared", &trail);
    let pipeline = Pipeline::new()
        .with_middleware(Rc::clone(&shared))
        .with_middleware(shared);

    pipeline.run(increment, None).unwrap();
    assert_eq!(trail.borrow().len(), 4);
}

#[test]
fn operation_handler_rejects_double_continuation_for_any_payload() {
    let twice = Rc::new(middleware_fn(
        |data: Option<Payload>, next: &mut PayloadNext<'_>| {
            next.run(data.clone())?;
            next.run(data)
        },
    ));
    let outer = Rc::new(middleware_fn(
        |data: Option<Payload>, next: &mut PayloadNext<'_>| next.run(data),
    ));
    let handler = Pipeline::operation_handler()
        .with_middleware(outer)
        .with_middleware(twice);

    for input in [None, Some(Payload { value: 7 })] {
        let runs = Cell::new(0);
        let err = handler
            .run(
                |data: Option<Payload>| {
                    runs.set(runs.get() + 1);
                    increment(data)
                },
                input,
            )
            .unwrap_err();
        assert_eq!(
            err,
            TestError::Pipeline(PipelineError::ContinuationReused { position: 1 })
        );
        assert_eq!(runs.get(), 1);
    }
}

#[test]
fn operation_handler_accepts_well_behaved_middleware() {
    let trail = Rc::new(RefCell::new(Vec::new()));
    let handler = Pipeline::operation_handler()
        .with_middleware(recorder("m1", &trail))
        .with_middleware(recorder("m2", &trail));

    let result = handler.run(add_five, Some(Payload { value: 1 })).unwrap();
    assert_eq!(result, Some(Payload { value: 6 }));
}

#[test]
fn with_guard_turns_pipeline_into_operation_handler() {
    let twice = Rc::new(middleware_fn(
        |data: Option<Payload>, next: &mut PayloadNext<'_>| {
            next.run(data.clone())?;
            next.run(data)
        },
    ));
    let unchecked = Pipeline::new().with_middleware(twice);
    let guarded = unchecked.with_guard(ContinuationGuard::AtMostOnce);
    assert_eq!(unchecked.guard(), ContinuationGuard::Unchecked);
    assert_eq!(guarded.guard(), ContinuationGuard::AtMostOnce);
    assert_eq!(guarded.len(), 1);

    let runs = Cell::new(0);
    let counted = |data: Option<Payload>| {
        runs.set(runs.get() + 1);
        increment(data)
    };

    let err = guarded
        .run(counted, Some(Payload { value: 1 }))
        .unwrap_err();
    assert_eq!(
        err,
        TestError::Pipeline(PipelineError::ContinuationReused { position: 0 })
    );
    assert_eq!(runs.get(), 1);

    runs.set(0);
    let rerun = unchecked.run(counted, Some(Payload { value: 1 })).unwrap();
    assert_eq!(rerun, Some(Payload { value: 2 }));
    assert_eq!(runs.get(), 2);
}

#[test]
fn from_middleware_keeps_declared_order() {
    let trail = Rc::new(RefCell::new(Vec::new()));
    let first: Rc<dyn Middleware<Payload, Payload, TestError>> = recorder("first", &trail);
    let second: Rc<dyn Middleware<Payload, Payload, TestError>> = recorder("second", &trail);
    let pipeline = Pipeline::from_middleware(vec![first, second]);
    assert_eq!(pipeline.len(), 2);
    assert_eq!(pipeline.guard(), ContinuationGuard::Unchecked);

    let result = pipeline.run(add_five, Some(Payload { value: 0 })).unwrap();

    assert_eq!(result, Some(Payload { value: 5 }));
    assert_eq!(
        *trail.borrow(),
        vec!["first:in", "second:in", "second:out", "first:out"]
    );
}

#[test]
fn runners_are_interchangeable_behind_the_trait() {
    fn run_with<R: OperationRunner<Payload, Payload, TestError>>(runner: &R) -> Option<Payload> {
        runner.run(increment, Some(Payload { value: 1 })).unwrap()
    }

    let trail = Rc::new(RefCell::new(Vec::new()));
    let pipeline = Pipeline::new().with_middleware(recorder("m", &trail));
    assert_eq!(run_with(&NoPipeline), Some(Payload { value: 2 }));
    assert_eq!(run_with(&pipeline), Some(Payload { value: 2 }));
}

#[test]
fn logging_pipeline_end_to_end() {
    let logger = Rc::new(RecordingLogger::default());
    let pipeline =
        Pipeline::new().with_middleware(Rc::new(LoggingMiddleware::with_logger(Rc::clone(&logger))));

    let result = pipeline.run(increment, Some(Payload { value: 5 })).unwrap();
    assert_eq!(result, Some(Payload { value: 6 }));

    let entries = logger.entries.borrow();
    assert_eq!(entries.len(), 2);
    assert!(entries[0].1.contains("status=start"));
    assert!(entries[1].1.contains("status=ok"));
}
