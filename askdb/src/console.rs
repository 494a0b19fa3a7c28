use common::db::AttemptFailure;
use common::report::Reporter;

/// prints session progress and result rows to stdout
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn sql_attempt(&self, attempt: u8, sql: &str) {
        println!("\nSQL (attempt {}): {}\n", attempt, sql);
    }

    fn executing(&self, sql: &str) {
        println!("\nExecuting:\n{}\n", sql);
    }

    fn row(&self, line: &str) {
        println!("{}", line);
    }

    fn row_count(&self, count: u64) {
        println!("\n{} row(s).", count);
    }

    fn first_failure(&self, failure: &AttemptFailure) {
        println!("\nFirst attempt failed: {}\nGenerating a fix...", failure);
    }

    fn final_failure(&self, failure: &AttemptFailure, catalog_text: &str) {
        println!("\nStill failing. Last error ({}):", failure.kind.as_str());
        println!("{}", failure);
        println!("\nDiscovered schema (summary):\n{}", catalog_text);
    }
}
