//! UnitOfWork - one transaction, one outbox, one request attempt.
//!
//! ```text
//! UnitOfWorkManager::begin(request_id)
//!     ├─ OutboxRepository::open   (insert or load, own session)
//!     └─ UnitOfWorkFactory::create (new session, begin, provision repositories)
//!
//! UnitOfWork
//!     ├─ outbox_mut()  publish / send / return_response
//!     ├─ commit()      outbox stored + transaction committed
//!     ├─ ensure_outbox_dispatched()
//!     └─ dispose()
//! ```

mod error;
mod factory;
mod manager;
mod unit_of_work;

pub use error::UnitOfWorkError;
pub use factory::{Provisioner, UnitOfWorkFactory};
pub use manager::UnitOfWorkManager;
pub use unit_of_work::{UnitOfWork, UnitOfWorkState};
