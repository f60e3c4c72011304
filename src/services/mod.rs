// src/services/mod.rs
pub mod geo_service;
pub mod moderation_service;
pub mod redis_repository;
pub mod report_repository;
pub mod ride_repository;
pub mod ride_service;
