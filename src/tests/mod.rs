//! Shared test fakes and cross-module pipeline tests.
