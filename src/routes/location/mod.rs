mod handler;
mod model;

pub use handler::{check_in, find_user, find_venue_users};
pub use model::{CheckinRequest, FindUserQuery, VenueUsersQuery};
