// In-process adapters for Conveyor
// Job records and broker channels held in memory (tests, single-process deployments)

pub mod broker;
pub mod job_repository;

pub use broker::InMemoryBroker;
pub use job_repository::InMemoryJobRepository;
