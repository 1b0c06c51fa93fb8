pub mod backup_record;
pub mod restore;
