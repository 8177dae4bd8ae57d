// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod columns;
pub mod error;
pub mod forms;
pub mod ids;
pub mod model;
pub mod record;
pub mod session;
pub mod state;
pub mod view;

pub use columns::*;
pub use error::*;
pub use forms::*;
pub use ids::*;
pub use model::*;
pub use record::*;
pub use session::*;
pub use state::*;
pub use view::*;
