use crate::llm::model::Message;

const EXAMPLE_QUESTION: &str =
    "Question: 'list active users with their roles and companies'. Return only: {\"sql\": \"SELECT ...\"}";

/// sql-generation rules plus the catalog the model may draw from
pub fn build_system_prompt(catalog_text: &str, limit: u32) -> String {
    format!(
        "You are a SQL generator for PostgreSQL. Respond ONLY with JSON containing the single key \"sql\".\n\
         Rules:\n\
         - SELECT only (use WITH/CTEs only when strictly necessary; prefer a single SELECT with direct JOINs).\n\
         - Never leave a comma after the last CTE. Correct syntax is: WITH cte1 AS (...), cte2 AS (...) SELECT ...\n\
         - Avoid SELECT *; list explicit columns and use aliases (e.g. usuario_email, kanban.id AS table_kanban_id).\n\
         - Use ONLY tables and columns from the schema below; follow foreign keys and junction tables.\n\
         - Use LIMIT {limit}. No comments, markdown or extra text.\n\
         - Use ONLY the exact column names listed.\n\
         Available schema:\n\
         {catalog_text}\n",
        limit = limit,
        catalog_text = catalog_text,
    )
}

pub fn build_user_prompt(question: &str, limit: u32) -> String {
    format!(
        "User question: {question}\n\
         Generate a valid SQL query that answers the question, following the system rules \
         (SELECT only, only columns from the schema, include LIMIT {limit}).\n\
         Return ONLY JSON with the key \"sql\".",
        question = question,
        limit = limit,
    )
}

pub fn build_repair_user_prompt(
    question: &str,
    failing_sql: &str,
    error_message: &str,
    limit: u32,
) -> String {
    format!(
        "The previous query failed to execute on PostgreSQL.\n\
         Original question: {question}\n\
         SQL that failed:\n\
         {failing_sql}\n\
         PostgreSQL error:\n\
         {error_message}\n\
         Generate ONE NEW corrected SQL query that answers the question, using only the schema given in the system message.\n\
         Rules: SELECT only (WITH/CTEs allowed), avoid SELECT *, alias columns, include LIMIT {limit}.\n\
         Return ONLY JSON with the key \"sql\".",
        question = question,
        failing_sql = failing_sql,
        error_message = error_message,
        limit = limit,
    )
}

/// `{"sql":"..."}`, the shape the model is asked to answer in
pub fn wrap_sql_as_json(sql: &str) -> String {
    serde_json::json!({ "sql": sql }).to_string()
}

fn example_sql(limit: u32) -> String {
    format!(
        "SELECT\n  \
           u.id, u.email, u.nome,\n  \
           COALESCE(string_agg(DISTINCT c.nome, ', '), '-') AS cargos,\n  \
           COALESCE(string_agg(DISTINCT e.razao_social, ', '), '-') AS empresas\n\
         FROM public.usuario u\n\
         LEFT JOIN public.usuario_cargo   uc ON uc.id_usuario = u.id\n\
         LEFT JOIN public.cargo           c  ON c.id          = uc.id_cargo\n\
         LEFT JOIN public.usuario_empresa ue ON ue.id_usuario = u.id\n\
         LEFT JOIN public.empresa         e  ON e.id          = ue.id_empresa\n\
         WHERE u.ativo = true\n\
         GROUP BY u.id, u.email, u.nome\n\
         ORDER BY u.nome\n\
         LIMIT {};",
        limit
    )
}

/// worked question/answer pair shown before the real question on the
/// first attempt only
pub fn example_messages(limit: u32) -> [Message; 2] {
    [
        Message::user(EXAMPLE_QUESTION),
        Message::assistant(wrap_sql_as_json(&example_sql(limit))),
    ]
}

/// `[system, example user, example assistant, user]`
pub fn initial_conversation(system_prompt: &str, user_prompt: &str, limit: u32) -> Vec<Message> {
    let mut messages = Vec::with_capacity(4);
    messages.push(Message::system(system_prompt));
    messages.extend(example_messages(limit));
    messages.push(Message::user(user_prompt));
    messages
}

/// `[system, repair user]`, independent of the first conversation
pub fn repair_conversation(system_prompt: &str, repair_prompt: &str) -> Vec<Message> {
    vec![Message::system(system_prompt), Message::user(repair_prompt)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::parser::extract_sql;
    use crate::llm::model::MessageRole;

    #[test]
    fn test_build_system_prompt() {
        let prompt = build_system_prompt("Tables/columns:\n- public.usuario(id, email)\n", 50);

        assert!(prompt.contains("\"sql\""));
        assert!(prompt.contains("LIMIT 50"));
        assert!(prompt.contains("Avoid SELECT *"));
        assert!(prompt.contains("- public.usuario(id, email)"));
    }

    #[test]
    fn test_build_system_prompt_with_empty_catalog() {
        let prompt = build_system_prompt("Tables/columns:\n", 100);
        assert!(prompt.contains("Tables/columns:"));
    }

    #[test]
    fn test_build_repair_user_prompt() {
        let prompt = build_repair_user_prompt(
            "how many companies?",
            "SELECT count(*) FROM public.empresas LIMIT 100",
            "42P01: relation \"public.empresas\" does not exist",
            100,
        );

        assert!(prompt.contains("how many companies?"));
        assert!(prompt.contains("SELECT count(*) FROM public.empresas LIMIT 100"));
        assert!(prompt.contains("relation \"public.empresas\" does not exist"));
        assert!(prompt.contains("LIMIT 100"));
    }

    #[test]
    fn test_example_answer_decodes() {
        let [question, answer] = example_messages(25);
        assert_eq!(question.role, MessageRole::User);
        assert_eq!(answer.role, MessageRole::Assistant);

        let sql = extract_sql(&answer.content).unwrap();
        assert!(sql.starts_with("SELECT"));
        assert!(sql.ends_with("LIMIT 25;"));
    }

    #[test]
    fn test_conversation_shapes() {
        let initial = initial_conversation("sys", "user", 100);
        let roles: Vec<MessageRole> = initial.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                MessageRole::System,
                MessageRole::User,
                MessageRole::Assistant,
                MessageRole::User
            ]
        );

        let repair = repair_conversation("sys", "fix it");
        assert_eq!(repair, vec![Message::system("sys"), Message::user("fix it")]);
    }
}
