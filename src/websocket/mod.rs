pub mod handler;
pub mod msg_mutation_handler;
pub mod msg_subscribe_handler;
