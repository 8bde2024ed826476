mod utils;

use std::rc::Rc;

use entity_writer::backend::{Backend, DiagnosticsGuard};
use entity_writer::{
    EntityRef, EntityWriter, Error, Identity, LookupStrategy, Record, WriterConfig, WriterState,
};
use utils::{Customer, Order, date, sqlite};

#[test]
fn test_run_suppresses_and_restores_statement_trace() -> anyhow::Result<()> {
    let backend = sqlite();
    let mut writer: EntityWriter<Customer, _> =
        EntityWriter::new(Rc::clone(&backend), &["email"], LookupStrategy::Exact)?;

    assert_eq!(backend.borrow().diagnostics(), Some(true));
    writer.prepare()?;
    assert_eq!(backend.borrow().diagnostics(), Some(false));
    writer.write_item(Record::new().with("email", "a@x.com"))?;
    writer.finish()?;
    assert_eq!(backend.borrow().diagnostics(), Some(true));
    Ok(())
}

#[test]
fn test_dropping_unfinished_writer_restores_trace() -> anyhow::Result<()> {
    let backend = sqlite();
    {
        let mut writer: EntityWriter<Customer, _> =
            EntityWriter::new(Rc::clone(&backend), &["email"], LookupStrategy::Exact)?;
        writer.prepare()?;
        writer.write_item(Record::new().with("email", "a@x.com"))?;
        assert_eq!(writer.state(), WriterState::Writing);
    }
    assert_eq!(backend.borrow().diagnostics(), Some(true));
    // never committed
    assert_eq!(backend.borrow().count::<Customer>()?, 0);
    Ok(())
}

#[test]
fn test_explicit_restore_after_failed_finish() -> anyhow::Result<()> {
    let backend = sqlite();
    backend.borrow_mut().persist(entity_writer::Managed::new(Customer {
        id: Some(1),
        email: "taken@x.com".to_string(),
        ..Customer::default()
    }))?;
    backend.borrow_mut().flush()?;

    let mut writer: EntityWriter<Customer, _> =
        EntityWriter::new(Rc::clone(&backend), &["email"], LookupStrategy::Exact)?
            .with_config(WriterConfig::default().with_truncate(false))?;
    writer.prepare()?;
    writer.write_item(Record::new().with("id", 1_i64).with("email", "clash@x.com"))?;

    assert!(matches!(writer.finish(), Err(Error::Constraint(_))));
    assert_eq!(writer.state(), WriterState::Writing);
    assert_eq!(backend.borrow().diagnostics(), Some(false));

    writer.restore_diagnostics();
    assert_eq!(backend.borrow().diagnostics(), Some(true));
    assert_eq!(backend.borrow().count::<Customer>()?, 1);
    Ok(())
}

#[test]
fn test_guard_without_diagnostics_capability() {
    let backend = utils::memory();
    let guard = DiagnosticsGuard::suppress(&backend);
    assert_eq!(guard.previous(), None);
    guard.restore();
    assert_eq!(backend.borrow().diagnostics(), None);
}

#[test]
fn test_orders_reference_customers() -> anyhow::Result<()> {
    let backend = sqlite();

    let mut customers: EntityWriter<Customer, _> =
        EntityWriter::new(Rc::clone(&backend), &["email"], LookupStrategy::Exact)?;
    customers.prepare()?;
    customers.write_item(
        Record::new()
            .with("email", "a@x.com")
            .with("signed_up", "2024-03-01"),
    )?;
    customers.finish()?;

    let mut orders: EntityWriter<Order, _> =
        EntityWriter::new(Rc::clone(&backend), &["ref"], LookupStrategy::Exact)?
            .with_config(WriterConfig::default().with_truncate(false).with_flush_threshold(1))?;
    orders.prepare()?;
    orders.write_item(
        Record::new()
            .with("ref", "o-1")
            .with("customer", 1_i64)
            .with("placed_at", "2024-03-02 10:30:00"),
    )?;
    orders.write_item(Record::new().with("ref", "o-2").with("total", "5"))?;
    orders.write_item(Record::new().with("ref", "o-1").with("total", 12.5))?;
    orders.finish()?;

    let stored = backend.borrow().all::<Order>()?;
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].reference, "o-1");
    assert_eq!(
        stored[0].customer,
        Some(EntityRef::new("Customer", Identity::Int(1)))
    );
    assert_eq!(stored[0].total, Some(12.5));
    assert_eq!(
        stored[0].placed_at,
        date(2024, 3, 2).and_hms_opt(10, 30, 0)
    );
    assert_eq!(stored[1].customer, None);
    assert_eq!(orders.stats().updated, 1);

    let customers = backend.borrow().all::<Customer>()?;
    assert_eq!(customers[0].signed_up, Some(date(2024, 3, 1)));
    Ok(())
}

#[test]
fn test_truncate_clears_table_in_prepare() -> anyhow::Result<()> {
    let backend = sqlite();
    let mut first: EntityWriter<Customer, _> =
        EntityWriter::new(Rc::clone(&backend), &["email"], LookupStrategy::Exact)?;
    first.prepare()?;
    first.write_item(Record::new().with("email", "a@x.com"))?;
    first.write_item(Record::new().with("email", "b@x.com"))?;
    first.finish()?;
    assert_eq!(backend.borrow().count::<Customer>()?, 2);

    let mut second: EntityWriter<Customer, _> =
        EntityWriter::new(Rc::clone(&backend), &["email"], LookupStrategy::Exact)?;
    second.prepare()?;
    assert_eq!(backend.borrow().count::<Customer>()?, 0);
    second.write_item(Record::new().with("email", "c@x.com"))?;
    second.finish()?;
    assert_eq!(backend.borrow().count::<Customer>()?, 1);
    Ok(())
}
