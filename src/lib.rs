// Linked-account records and SQLite persistence
pub mod accounts;

// HTTP surface (OAuth redirect/callback)
pub mod api;

// Chat command replies
pub mod commands;

// Settings file and required environment
pub mod config;

// Credential cipher and bearer token wrapper
pub mod credentials;

// Remote provider (GitHub) clients
pub mod github;

// Link manager and OAuth correlation state
pub mod link;
