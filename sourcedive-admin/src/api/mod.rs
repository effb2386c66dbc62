//! HTTP API handlers for sourcedive-admin

pub mod auth;
pub mod buildinfo;
pub mod dives;
pub mod health;
pub mod interactions;
pub mod people;
pub mod taxonomy;
pub mod transfer;
pub mod ui;
pub mod users;

pub use auth::auth_middleware;
pub use buildinfo::get_build_info;
pub use dives::{add_dive_member, create_dive, list_dives, remove_dive_member};
pub use health::health_routes;
pub use interactions::{
    create_interaction, delete_interaction, get_interaction, list_interactions,
    update_interaction,
};
pub use people::{
    create_person, delete_person, get_person, list_people, people_filters, person_layout,
    update_person,
};
pub use taxonomy::taxonomy_routes;
pub use transfer::{export_csv, import_csv};
pub use ui::{serve_app_js, serve_index};
pub use users::{current_user, list_users};
