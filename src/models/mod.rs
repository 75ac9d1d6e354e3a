mod album;
mod page;
mod photo;
mod state;

pub use album::{Album, AlbumChanges, AlbumView, NewAlbum};
pub use page::{PageQuery, Paginated, PaginationInfo};
pub use photo::{Photo, PhotoView};
pub use state::AppState;
