pub mod agent_reference;
pub mod api_call;
pub mod combine;
pub mod debug;
pub mod io;
pub mod state;
pub mod text;
