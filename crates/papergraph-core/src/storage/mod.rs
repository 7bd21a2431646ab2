pub mod json_records;

pub use json_records::{
    list_records, load_links, load_record, save_links, save_record,
    save_records,
};
