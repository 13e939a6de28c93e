use std::collections::BTreeMap;

use flow_core::{normalize_phone, StudentDirectory};
use shared::{domain::StudentId, records::Student};
use tracing::debug;

#[derive(Debug, Clone)]
struct Guardian {
    name: String,
    students: Vec<Student>,
}

/// Guardian and student records keyed by normalised phone number.
#[derive(Debug, Clone, Default)]
pub struct SeededDirectory {
    guardians: BTreeMap<String, Guardian>,
}

fn student(name: &str, id: &str, grade: &str, balances: u32) -> Student {
    Student {
        name: name.to_string(),
        id: StudentId::new(id),
        grade: grade.to_string(),
        balances,
    }
}

impl SeededDirectory {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The demo guardians the front ends ship with.
    pub fn demo() -> Self {
        let mut directory = Self::empty();
        directory.register(
            "977123456",
            "Mr Stephen Kapambwe",
            vec![
                student("Talitha Kapambwe", "C20012", "Grade 3B", 0),
                student("Isaiah Kapambwe", "C30013", "Grade 4A", 1),
            ],
        );
        directory.register(
            "966987654",
            "Mrs Alice Mwamba",
            vec![
                student("John Mwansa", "C20013", "Grade 5A", 0),
                student("Sarah Banda", "C20014", "Grade 6B", 2),
            ],
        );
        directory
    }

    /// Replaces any guardian already registered under `phone`.
    pub fn register(&mut self, phone: &str, name: &str, students: Vec<Student>) {
        self.guardians.insert(
            normalize_phone(phone),
            Guardian {
                name: name.to_string(),
                students,
            },
        );
    }

    pub fn phones(&self) -> impl Iterator<Item = &str> + '_ {
        self.guardians.keys().map(String::as_str)
    }
}

impl StudentDirectory for SeededDirectory {
    fn students_for_phone(&self, phone: &str) -> Vec<Student> {
        let phone = normalize_phone(phone);
        let students = self
            .guardians
            .get(&phone)
            .map(|guardian| guardian.students.clone())
            .unwrap_or_default();
        debug!(%phone, count = students.len(), "student lookup");
        students
    }

    fn guardian_name(&self, phone: &str) -> Option<String> {
        self.guardians
            .get(&normalize_phone(phone))
            .map(|guardian| guardian.name.clone())
    }
}
