//! Domain services layered over the REST client.
//!
//! ARCHITECTURE
//! ============
//! Services own cross-call policy (such as "one AI rewrite at a time") so
//! the REST client stays a thin, coalescing transport for single endpoints.

pub mod ai;
