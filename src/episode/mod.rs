mod download;
mod filename;

pub use download::{DownloadContext, download_episode, is_downloaded};
pub use filename::{download_path, local_filename, partial_path, podcast_folder_name};
