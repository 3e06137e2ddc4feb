//! Integration tests for the API client
//! These run the client end to end over HTTP and a session file on disk

pub mod test_harness;

pub mod refresh_flow_test;
pub mod response_mapping_test;
pub mod session_store_test;
