pub mod decision_service;
pub mod feed_service;
pub mod status_cache;
pub mod storage_service;
pub mod url_signer;

#[cfg(test)]
pub mod test_support;
