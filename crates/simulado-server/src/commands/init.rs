//! The `simulado init` command.

use std::path::Path;

use anyhow::Result;

pub fn execute() -> Result<()> {
    if Path::new("simulado.toml").exists() {
        println!("simulado.toml already exists, skipping.");
    } else {
        std::fs::write("simulado.toml", SAMPLE_CONFIG)?;
        println!("Created simulado.toml");
    }

    std::fs::create_dir_all("banks")?;
    let bank_path = Path::new("banks/exemplo.toml");
    if bank_path.exists() {
        println!("banks/exemplo.toml already exists, skipping.");
    } else {
        std::fs::write(bank_path, EXAMPLE_BANK)?;
        println!("Created banks/exemplo.toml");
    }

    println!("\nNext steps:");
    println!("  1. Edit simulado.toml (storage backend and identity tokens)");
    println!("  2. Run: simulado validate --bank banks/exemplo.toml");
    println!("  3. Run: simulado seed --bank banks");
    println!("  4. Run: simulado serve");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# simulado configuration

[server]
bind = "127.0.0.1:5000"

[storage]
type = "sqlite"
path = "simulado.db"

# [storage]
# type = "firestore"
# project_id = "my-project"
# access_token = "${SIMULADO_FIRESTORE_TOKEN}"

[identity]
type = "static"

[identity.tokens]
"${SIMULADO_DEV_TOKEN}" = "dev-user"

[selection]
default_total_questions = 20
# max_total_questions = 100
minutes_per_question = 2
easy_below = 40.0
hard_above = 70.0
"#;

const EXAMPLE_BANK: &str = r#"[bank]
id = "exemplo"
name = "Banco de Exemplo"
description = "Questões de exemplo para começar"
default_exam_board = "CESPE"
default_exam_year = 2023
default_difficulty = "medium"

[[questions]]
id = "pt-crase"
title = "Crase"
statement = "Assinale a alternativa em que o uso do acento grave está correto."
subject = "Português"
difficulty = "easy"
correct = "b"
explanation = "Há crase diante de palavra feminina que admite artigo."
tags = ["gramática"]

[[questions.alternatives]]
id = "a"
text = "Vou à pé para o trabalho."

[[questions.alternatives]]
id = "b"
text = "Entreguei o relatório à delegada."

[[questions.alternatives]]
id = "c"
text = "Começou à chover."

[[questions.alternatives]]
id = "d"
text = "Fiquei frente à frente com ele."

[[questions]]
id = "dc-legalidade"
title = "Princípio da legalidade"
statement = "Segundo o princípio da legalidade, a administração pública pode agir:"
subject = "Direito Constitucional"
correct = "a"

[[questions.alternatives]]
id = "a"
text = "Somente quando a lei autoriza."

[[questions.alternatives]]
id = "b"
text = "Sempre que a lei não proíbe."

[[questions.alternatives]]
id = "c"
text = "Conforme a conveniência do gestor."

[[questions]]
id = "mat-porcentagem"
title = "Porcentagem"
statement = "Um efetivo de 80 policiais teve aumento de 25%. Qual o novo efetivo?"
subject = "Matemática"
difficulty = "hard"
correct = "c"

[[questions.alternatives]]
id = "a"
text = "95"

[[questions.alternatives]]
id = "b"
text = "105"

[[questions.alternatives]]
id = "c"
text = "100"
"#;
