mod in_memory_store;

pub use in_memory_store::InMemoryAggregateStore;
