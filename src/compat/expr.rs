//! Raw SQL expressions

pub use crate::models::query_builder::SqlExpr;
use crate::models::query_builder::Arg;

/// Raw SQL fragment usable as a condition, update value or argument
///
/// ```ignore
/// db.model(&product).update("price", expr("price * ? + ?", args![2, 100]));
/// ```
pub fn expr(sql: &str, args: Vec<Arg>) -> SqlExpr {
    SqlExpr::new(sql, args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args;

    #[test]
    fn test_expr_keeps_arguments() {
        let e = expr("price * ? + ?", args![2, 100]);
        assert_eq!(e.sql, "price * ? + ?");
        assert_eq!(e.args.len(), 2);
        assert!(!e.is_empty());
        assert!(SqlExpr::default().is_empty());
    }
}
