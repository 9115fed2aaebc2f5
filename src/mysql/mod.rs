//! MySQL/MariaDB backend over `mysql_async`.

mod connection;
mod params;

pub use connection::MysqlConnection;
pub use params::{
    CastOptions, ColumnShape, mysql_value_to_row_value, row_value_to_mysql_value,
};
