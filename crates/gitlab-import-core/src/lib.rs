pub mod bootstrap;
pub mod doubles;
pub mod error;
pub mod import_engine;
pub mod mapper;
pub mod model;
pub mod paging;
pub mod provider;
pub mod report;
pub mod request;
pub mod trigger;
