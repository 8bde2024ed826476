mod utils;

use std::rc::Rc;

use entity_writer::backend::{Backend, LookupStrategy, Managed};
use entity_writer::{
    EntityRef, EntityWriter, Error, Identity, Pipeline, Record, RecordStage, ReferenceResolver,
    Value, WriterConfig,
};
use utils::{Country, Customer, Order, memory, sqlite};

fn customer(email: &str) -> Customer {
    Customer {
        email: email.to_string(),
        ..Customer::default()
    }
}

#[test]
fn test_resolves_existing_entity() -> anyhow::Result<()> {
    let backend = memory();
    let id = backend.borrow_mut().insert(&customer("a@x.com"))?;

    let resolver: ReferenceResolver<Customer, _> =
        ReferenceResolver::new(Rc::clone(&backend), &["email"], "customer", LookupStrategy::Exact)?;
    let record = resolver.apply(Record::new().with("email", "a@x.com").with("ref", "o-1"))?;

    assert_eq!(
        record.get("customer"),
        Some(&Value::Ref(EntityRef::new("Customer", id)))
    );
    assert_eq!(record.get("email"), Some(&Value::from("a@x.com")));
    Ok(())
}

#[test]
fn test_no_match_overwrites_stale_output() -> anyhow::Result<()> {
    let backend = memory();
    backend.borrow_mut().insert(&customer("a@x.com"))?;
    let resolver: ReferenceResolver<Customer, _> =
        ReferenceResolver::new(Rc::clone(&backend), &["email"], "customer", LookupStrategy::Exact)?;

    let unknown = resolver.apply(
        Record::new()
            .with("email", "nobody@x.com")
            .with("customer", "stale"),
    )?;
    assert_eq!(unknown.get("customer"), Some(&Value::Null));

    let missing = resolver.apply(Record::new().with("customer", "stale"))?;
    assert_eq!(missing.get("customer"), Some(&Value::Null));

    let empty = resolver.apply(Record::new().with("email", ""))?;
    assert_eq!(empty.get("customer"), Some(&Value::Null));
    Ok(())
}

#[test]
fn test_without_lookup_fields_nothing_matches() -> anyhow::Result<()> {
    let backend = memory();
    backend.borrow_mut().insert(&customer("a@x.com"))?;
    let resolver: ReferenceResolver<Customer, _> =
        ReferenceResolver::new(Rc::clone(&backend), &[], "customer", LookupStrategy::default())?;
    assert_eq!(
        resolver.resolve(&Record::new().with("email", "a@x.com"))?,
        Value::Null
    );
    Ok(())
}

#[test]
fn test_construction_errors() {
    let backend = memory();
    assert!(matches!(
        ReferenceResolver::<Customer, _>::new(
            Rc::clone(&backend),
            &["email"],
            "customer",
            LookupStrategy::from_name("soundex"),
        ),
        Err(Error::UnsupportedBackend(_))
    ));
    assert!(matches!(
        ReferenceResolver::<Customer, _>::new(
            Rc::clone(&backend),
            &["phone"],
            "customer",
            LookupStrategy::Exact,
        ),
        Err(Error::InvalidConfig(_))
    ));
    assert!(matches!(
        ReferenceResolver::<Customer, _>::new(Rc::clone(&backend), &["email"], "", LookupStrategy::Exact),
        Err(Error::InvalidConfig(_))
    ));
}

#[test]
fn test_custom_strategy_registered_on_memory_backend() -> anyhow::Result<()> {
    let backend = memory();
    backend
        .borrow_mut()
        .register_lookup("domain", |stored, wanted| match (stored.as_str(), wanted.as_str()) {
            (Some(email), Some(domain)) => email.ends_with(&format!("@{domain}")),
            _ => false,
        });
    let id = backend.borrow_mut().insert(&customer("a@example.org"))?;

    let resolver: ReferenceResolver<Customer, _> = ReferenceResolver::new(
        Rc::clone(&backend),
        &["email"],
        "customer",
        LookupStrategy::from_name("domain"),
    )?;
    assert_eq!(
        resolver.resolve(&Record::new().with("email", "example.org"))?,
        Value::Ref(EntityRef::new("Customer", id))
    );
    Ok(())
}

#[test]
fn test_staged_entities_resolve_to_their_identity() -> anyhow::Result<()> {
    let backend = memory();
    backend.borrow_mut().persist(Managed::new(Customer {
        id: Some(9),
        ..customer("staged@x.com")
    }))?;
    backend.borrow_mut().persist(Managed::new(customer("noid@x.com")))?;

    let resolver: ReferenceResolver<Customer, _> =
        ReferenceResolver::new(Rc::clone(&backend), &["email"], "customer", LookupStrategy::Exact)?;
    assert_eq!(
        resolver.resolve(&Record::new().with("email", "staged@x.com"))?,
        Value::Ref(EntityRef::new("Customer", Identity::Int(9)))
    );
    // the identity is reserved when staged, before the flush
    assert_eq!(
        resolver.resolve(&Record::new().with("email", "noid@x.com"))?,
        Value::Ref(EntityRef::new("Customer", Identity::Int(10)))
    );
    Ok(())
}

#[test]
fn test_staged_text_identity_without_value_is_an_error() -> anyhow::Result<()> {
    let backend = memory();
    backend.borrow_mut().persist(Managed::new(Country {
        code: String::new(),
        name: "Nowhere".to_string(),
    }))?;
    let resolver: ReferenceResolver<Country, _> =
        ReferenceResolver::new(Rc::clone(&backend), &["name"], "country", LookupStrategy::Exact)?;
    assert!(matches!(
        resolver.resolve(&Record::new().with("name", "Nowhere")),
        Err(Error::Constraint(_))
    ));
    Ok(())
}

#[test]
fn test_order_written_in_same_batch_references_new_customer() -> anyhow::Result<()> {
    let backend = sqlite();
    let config = WriterConfig::default().with_truncate(false);
    let mut customers: EntityWriter<Customer, _> =
        EntityWriter::new(Rc::clone(&backend), &["email"], "exact")?.with_config(config.clone())?;
    let mut orders: EntityWriter<Order, _> =
        EntityWriter::new(Rc::clone(&backend), &["ref"], "exact")?.with_config(config)?;
    let pipeline = Pipeline::new().stage(ReferenceResolver::<Customer, _>::new(
        Rc::clone(&backend),
        &["email"],
        "customer",
        LookupStrategy::Exact,
    )?);
    customers.prepare()?;
    orders.prepare()?;

    customers.write_item(Record::new().with("email", "a@x.com"))?;
    let order = pipeline.process(Record::new().with("ref", "o-1").with("email", "a@x.com"))?;
    assert_eq!(
        order.get("customer"),
        Some(&Value::Ref(EntityRef::new("Customer", Identity::Int(1))))
    );
    orders.write_item(order)?;

    customers.finish()?;
    orders.finish()?;
    let stored = backend.borrow().all::<Order>()?;
    assert_eq!(
        stored[0].customer,
        Some(EntityRef::new("Customer", Identity::Int(1)))
    );
    assert_eq!(backend.borrow().all::<Customer>()?[0].id, Some(1));
    Ok(())
}

#[test]
fn test_case_insensitive_lookup_on_sqlite() -> anyhow::Result<()> {
    let backend = sqlite();
    backend.borrow_mut().persist(Managed::new(customer("Ada@X.com")))?;
    backend.borrow_mut().flush()?;

    let exact: ReferenceResolver<Customer, _> =
        ReferenceResolver::new(Rc::clone(&backend), &["email"], "customer", LookupStrategy::Exact)?;
    let relaxed: ReferenceResolver<Customer, _> = ReferenceResolver::new(
        Rc::clone(&backend),
        &["email"],
        "customer",
        LookupStrategy::CaseInsensitive,
    )?;
    let record = Record::new().with("email", "ada@x.com");

    assert_eq!(exact.resolve(&record)?, Value::Null);
    assert_eq!(
        relaxed.resolve(&record)?,
        Value::Ref(EntityRef::new("Customer", Identity::Int(1)))
    );
    Ok(())
}

#[test]
fn test_resolver_feeds_writer_association() -> anyhow::Result<()> {
    let backend = memory();
    let id = backend.borrow_mut().insert(&customer("a@x.com"))?;
    let pipeline = Pipeline::new().stage(ReferenceResolver::<Customer, _>::new(
        Rc::clone(&backend),
        &["email"],
        "customer",
        LookupStrategy::Exact,
    )?);

    let record = pipeline.process_json(serde_json::json!({ "ref": "o-1", "email": "a@x.com" }))?;
    assert_eq!(
        record.get("customer").and_then(Value::as_entity_ref),
        Some(&EntityRef::new("Customer", id))
    );
    assert_eq!(backend.borrow().pending(), 0);
    Ok(())
}
