pub mod catalog;
pub mod composite;
pub mod db;
pub mod error;
pub mod goals;
pub mod meals;
pub mod models;
pub mod nutrients;
pub mod service;
pub mod stats;
pub mod training;
