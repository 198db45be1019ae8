pub mod books;
pub mod health;
pub mod jobs;
pub mod maintenance;
pub mod pages;
