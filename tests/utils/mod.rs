#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use chrono::{NaiveDate, NaiveDateTime};
use entity_writer::{Entity, EntityRef, MemoryBackend, SqliteBackend};

/// Customer fixture, looked up by email
#[derive(Debug, Clone, Default, PartialEq, Entity)]
#[entity(table = "customers")]
pub struct Customer {
    pub id: Option<i64>,
    pub email: String,
    pub status: Option<String>,
    pub name: Option<String>,
    pub signed_up: Option<NaiveDate>,
}

/// Order fixture with an association to `Customer`
#[derive(Debug, Clone, Default, PartialEq, Entity)]
#[entity(table = "orders")]
pub struct Order {
    pub id: Option<i64>,
    #[entity(rename = "ref")]
    pub reference: String,
    #[entity(association = "Customer")]
    pub customer: Option<EntityRef>,
    pub total: Option<f64>,
    pub placed_at: Option<NaiveDateTime>,
    #[entity(readonly)]
    pub audit: Option<String>,
    #[entity(skip)]
    pub scratch: Vec<u8>,
}

/// Country fixture with a text identifier
#[derive(Debug, Clone, Default, PartialEq, Entity)]
#[entity(table = "countries")]
pub struct Country {
    #[entity(id)]
    pub code: String,
    pub name: String,
}

/// Enable log output in tests, honouring `RUST_LOG`
pub fn init() {
    entity_writer::utils::logging::init_logging();
}

/// Fresh in-memory backend
#[must_use]
pub fn memory() -> Rc<RefCell<MemoryBackend>> {
    init();
    Rc::new(RefCell::new(MemoryBackend::new()))
}

/// Fresh SQLite backend with every fixture table created
#[must_use]
pub fn sqlite() -> Rc<RefCell<SqliteBackend>> {
    init();
    let backend = SqliteBackend::open_in_memory().expect("open in-memory database");
    backend.create_table::<Customer>().expect("create customers");
    backend.create_table::<Order>().expect("create orders");
    backend.create_table::<Country>().expect("create countries");
    Rc::new(RefCell::new(backend))
}

#[must_use]
pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}
