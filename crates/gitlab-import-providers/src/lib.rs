pub mod backend;
pub mod gitlab;
mod gitlab_paging;
pub mod http;
#[cfg(test)]
mod test_server;

pub use backend::BackendHttpClient;
pub use gitlab::GitLabClient;
pub use http::HttpSettings;
