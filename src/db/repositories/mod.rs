mod records;
mod reports;
mod sessions;
