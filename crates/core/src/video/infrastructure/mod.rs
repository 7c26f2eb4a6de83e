pub mod default_source_opener;
pub mod ffmpeg_source;
pub mod image_file_source;
pub mod memory_source;
