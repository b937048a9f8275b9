use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE_NAME: &str = "campus.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            department TEXT NOT NULL,
            year TEXT NOT NULL,
            roll_no TEXT,
            email TEXT,
            section TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    // Workspaces created before section generation existed lack these columns.
    ensure_students_section(&conn)?;
    ensure_students_updated_at(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_cohort ON students(department, year)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS results(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            subject TEXT NOT NULL,
            marks_obtained REAL NOT NULL,
            marks_max REAL NOT NULL,
            exam_type TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_results_student ON results(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            student_id TEXT NOT NULL,
            subject TEXT NOT NULL,
            date TEXT NOT NULL,
            present INTEGER NOT NULL,
            PRIMARY KEY(student_id, subject, date),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_student ON attendance(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS cohort_generations(
            department TEXT NOT NULL,
            year TEXT NOT NULL,
            generation INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY(department, year)
        )",
        [],
    )?;

    Ok(conn)
}

fn ensure_students_section(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "students", "section")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE students ADD COLUMN section TEXT", [])?;
    Ok(())
}

fn ensure_students_updated_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "students", "updated_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE students ADD COLUMN updated_at TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
