// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod backend;
pub mod client_rows;
pub mod filter;
pub mod gate;
pub mod ids;
pub mod loader;
pub mod model;
pub mod mutation;
pub mod paged_rows;
pub mod route;
pub mod row;
pub mod schema;
pub mod session;
pub mod state;

pub use backend::*;
pub use client_rows::*;
pub use filter::*;
pub use gate::*;
pub use ids::*;
pub use loader::*;
pub use model::*;
pub use mutation::*;
pub use paged_rows::*;
pub use route::*;
pub use row::*;
pub use schema::*;
pub use session::*;
pub use state::*;
