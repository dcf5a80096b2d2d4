pub mod file;
pub mod returns_csv;
pub mod stdin;
