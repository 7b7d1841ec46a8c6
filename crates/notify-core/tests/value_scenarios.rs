//! End-to-end scenarios for value objects, synchronization, and pinning.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use notify_core::{
    Callable, Constant, Error, Handler, Mediator, PinRegistry, Synchronize, ValueObject, Variable,
};

fn counting_handler<T: 'static>(calls: &Rc<Cell<u32>>) -> Handler<T> {
    let calls = Rc::clone(calls);
    Callable::function(move |_: &T| {
        calls.set(calls.get() + 1);
        Ok(())
    })
}

fn recording_handler<T: Clone + 'static>(log: &Rc<RefCell<Vec<T>>>) -> Handler<T> {
    let log = Rc::clone(log);
    Callable::function(move |value: &T| {
        log.borrow_mut().push(value.clone());
        Ok(())
    })
}

#[test]
fn store_reports_initial_value_then_changes() {
    let var = Variable::new(1);
    let log = Rc::new(RefCell::new(Vec::new()));
    var.store(recording_handler(&log)).unwrap();

    var.set(2).unwrap();
    var.set(2).unwrap();
    var.set(3).unwrap();

    assert_eq!(*log.borrow(), vec![1, 2, 3]);
}

#[test]
fn synchronized_pair_converges_without_runaway_feedback() {
    let a = Rc::new(Variable::new(0));
    let b = Rc::new(Variable::new(0));
    a.synchronize(&b).unwrap();

    let a_changes = Rc::new(Cell::new(0));
    let b_changes = Rc::new(Cell::new(0));
    a.signal_changed().connect(counting_handler(&a_changes)).unwrap();
    b.signal_changed().connect(counting_handler(&b_changes)).unwrap();

    a.set(5).unwrap();
    assert_eq!(b.get(), 5);
    assert_eq!(a_changes.get(), 1);
    assert_eq!(b_changes.get(), 1);

    // Same value: nothing fires.
    assert_eq!(b.set(5), Ok(false));
    assert_eq!(a_changes.get(), 1);
    assert_eq!(b_changes.get(), 1);
}

#[test]
fn synchronize_takes_partner_value() {
    let a = Rc::new(Variable::new("left".to_string()));
    let b = Rc::new(Variable::new("right".to_string()));
    a.synchronize(&b).unwrap();
    assert_eq!(a.get(), "right");
    assert_eq!(b.get(), "right");
}

#[test]
fn negating_mediator_keeps_pair_opposite() {
    let not = Mediator::infallible(|v: &bool| !v, |v: &bool| !v);
    let a = Rc::new(Variable::new(true));
    let b = Rc::new(Variable::new(true));

    a.synchronize_with(&b, &not).unwrap();
    assert!(!a.get());
    assert!(b.get());

    assert_eq!(a.set(false), Ok(false));
    assert!(b.get());

    b.set(false).unwrap();
    assert!(a.get());

    a.set(false).unwrap();
    assert!(b.get());
}

#[test]
fn converting_mediator_between_types() {
    let text = Mediator::new(
        |n: &i32| Ok(n.to_string()),
        |s: &String| {
            s.parse::<i32>()
                .map_err(|err| Error::invalid_value(format!("{s:?}: {err}")))
        },
    );
    let label = Rc::new(Variable::new(String::new()));
    let number = Rc::new(Variable::new(12));
    label.synchronize_with(&number, &text).unwrap();
    assert_eq!(label.get(), "12");

    number.set(40).unwrap();
    assert_eq!(label.get(), "40");

    label.set("7".to_string()).unwrap();
    assert_eq!(number.get(), 7);

    // The label already holds the new text; the number keeps its value.
    assert!(matches!(
        label.set("seven".to_string()),
        Err(Error::InvalidValue { .. })
    ));
    assert_eq!(number.get(), 7);
}

#[test]
fn synchronize_safe_is_idempotent() {
    let a = Rc::new(Variable::new(1));
    let b = Rc::new(Variable::new(2));
    a.synchronize_safe(&b).unwrap();
    a.synchronize_safe(&b).unwrap();

    assert_eq!(a.signal_changed().count_handlers(), 1);
    assert_eq!(b.signal_changed().count_handlers(), 1);

    let mediator = Mediator::infallible(|v: &i32| v * 2, |v: &i32| v / 2);
    let c = Rc::new(Variable::new(0));
    c.synchronize_safe_with(&a, &mediator).unwrap();
    c.synchronize_safe_with(&a, &mediator).unwrap();
    assert_eq!(c.get(), 4);
    assert_eq!(c.signal_changed().count_handlers(), 1);
    assert_eq!(a.signal_changed().count_handlers(), 2);
}

#[test]
fn desynchronize_with_matches_mediator_identity() {
    let mediator = Mediator::infallible(|v: &i32| v + 1, |v: &i32| v - 1);
    let lookalike = Mediator::infallible(|v: &i32| v + 1, |v: &i32| v - 1);
    let a = Rc::new(Variable::new(0));
    let b = Rc::new(Variable::new(0));
    a.synchronize_with(&b, &mediator).unwrap();

    assert!(!a.desynchronize_with(&b, &lookalike));
    assert!(a.desynchronize_with(&b, &mediator));

    b.set(10).unwrap();
    assert_eq!(a.get(), 1);
}

#[test]
fn validator_rejection_propagates_through_sync() {
    let even = Rc::new(Variable::with_validator(0, |v: &i32| v % 2 == 0).unwrap());
    let free = Rc::new(Variable::new(0));
    even.synchronize(&free).unwrap();

    assert!(matches!(free.set(3), Err(Error::InvalidValue { .. })));
    assert_eq!(even.get(), 0);

    free.set(4).unwrap();
    assert_eq!(even.get(), 4);
}

#[test]
fn synchronize_rejects_immutable_partner() {
    let var = Rc::new(Variable::new(1));
    let constant = Rc::new(Constant::new(2));

    assert!(matches!(
        var.synchronize(&constant),
        Err(Error::NotMutable { .. })
    ));
    assert_eq!(var.get(), 1);
    assert_eq!(constant.signal_changed().count_handlers(), 0);
}

#[test]
fn failing_observer_leaves_registrations_intact() {
    let var = Variable::new(0);
    let first = Rc::new(RefCell::new(Vec::new()));
    let last = Rc::new(RefCell::new(Vec::new()));
    let signal = var.signal_changed();
    signal.connect(recording_handler(&first)).unwrap();
    signal
        .connect(Callable::function(|_: &i32| Err(Error::handler("refused"))))
        .unwrap();
    signal.connect(recording_handler(&last)).unwrap();

    assert_eq!(var.set(1), Err(Error::handler("refused")));
    // The value is stored before observers run.
    assert_eq!(var.get(), 1);
    assert_eq!(*first.borrow(), vec![1]);
    assert!(last.borrow().is_empty());
    assert_eq!(signal.count_handlers(), 3);
}

#[test]
fn dropped_partner_stops_receiving() {
    let a = Rc::new(Variable::new(0));
    let b = Rc::new(Variable::new(0));
    a.synchronize(&b).unwrap();
    assert_eq!(a.signal_changed().count_handlers(), 1);

    drop(b);
    a.set(3).unwrap();
    assert_eq!(a.signal_changed().count_handlers(), 0);
}

#[test]
fn pinning_keeps_weakly_synchronized_partner_alive() {
    let registry = PinRegistry::new();
    let a = Rc::new(Variable::new(0));
    let b = Rc::new(Variable::new(0));
    a.synchronize(&b).unwrap();

    let observed = Rc::downgrade(&b);
    let guard = registry.pin(&b).unwrap();
    drop(b);

    a.set(8).unwrap();
    assert_eq!(observed.upgrade().map(|b| b.get()), Some(8));

    guard.release();
    assert!(observed.upgrade().is_none());
    a.set(9).unwrap();
    assert_eq!(a.signal_changed().count_handlers(), 0);
}

#[test]
fn handler_may_set_another_variable_reentrantly() {
    let source = Rc::new(Variable::new(1));
    let doubled = Rc::new(Variable::new(0));

    fn follow_double(target: &Variable<i32>, value: &i32) -> notify_core::Result<()> {
        target.set(value * 2).map(|_| ())
    }
    source
        .store(Callable::method(&doubled, follow_double))
        .unwrap();
    assert_eq!(doubled.get(), 2);

    source.set(21).unwrap();
    assert_eq!(doubled.get(), 42);
    assert_eq!(Rc::strong_count(&doubled), 1);
}
