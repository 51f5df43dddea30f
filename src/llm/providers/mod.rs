pub mod ollama;
pub mod remote;

/// Prompt shared by both backends for SQL generation against DuckDB.
pub(crate) fn sql_prompt(question: &str, schema: &str, top_k: usize) -> String {
    format!(
        r#"
### Instructions:
You are a DuckDB expert. Given an input question, create a syntactically correct DuckDB query to run.
Adhere to these rules:
- Unless the question asks for a specific number of examples, query for at most {top_k} results using the LIMIT clause
- Never query for all columns from a table; select only the columns needed to answer the question
- Only use the tables and columns listed below, with the exact spelling shown
- Wrap column names in double quotes when they contain spaces or special characters
- Only write a single read-only SELECT statement and end it with a semicolon

### Input:
Generate a SQL query that answers the question `{question}`.
The query will run on a DuckDB database with the following tables:

{schema}

### Response:
Based on your instructions, here is the SQL query I have generated to answer the question `{question}`:
```sql
"#
    )
}
