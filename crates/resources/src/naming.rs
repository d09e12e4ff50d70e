//! 리소스 이름 규칙
//!
//! 백엔드마다 식별자 규칙이 다르며 [`NamingConvention`]으로 표현합니다.
//! 네임스페이스는 `<testId>-<suffix>` 형태로 생성되어 동시에 실행되는 테스트끼리 충돌하지 않습니다.
//! `-`가 허용되지 않는 백엔드에서는 구분자를 대체 문자로 바꿉니다.

use uuid::Uuid;

/// 생성된 이름에 붙는 랜덤 접미사 길이
pub const SUFFIX_LEN: usize = 8;

/// 백엔드 하나의 식별자 규칙
#[derive(Debug, Clone, Copy)]
pub struct NamingConvention {
    /// 백엔드가 식별자에 허용하는 문자면 true
    pub allowed: fn(char) -> bool,
    /// 허용되지 않는 문자를 대신할 문자
    pub replacement: char,
    /// 식별자 최대 길이
    pub max_len: usize,
    /// 소문자로 변환할지 여부
    pub lowercase: bool,
}

impl NamingConvention {
    /// `test_id`로 충돌하지 않는 이름을 생성합니다.
    pub fn generate(&self, test_id: &str) -> String {
        self.generate_with_suffix(test_id, &random_suffix())
    }

    /// 접미사를 직접 지정하는 [`generate`](Self::generate)
    pub fn generate_with_suffix(&self, test_id: &str, suffix: &str) -> String {
        let separator = if (self.allowed)('-') {
            '-'
        } else {
            self.replacement
        };
        let suffix = self.sanitize(suffix);
        let budget = self.max_len.saturating_sub(suffix.len() + 1);

        let mut prefix = self.sanitize(test_id);
        if !prefix.starts_with(|c: char| c.is_ascii_alphabetic()) {
            prefix.insert(0, 't');
        }
        // sanitize()는 ASCII만 남기므로 바이트 단위로 잘라도 안전
        prefix.truncate(budget);
        let prefix = prefix.trim_end_matches(|c: char| c == separator || c == self.replacement);

        format!("{prefix}{separator}{suffix}")
    }

    /// 허용되지 않는 문자를 치환하고 대소문자를 정리합니다.
    pub fn sanitize(&self, raw: &str) -> String {
        raw.chars()
            .map(|c| {
                let c = if self.lowercase {
                    c.to_ascii_lowercase()
                } else {
                    c
                };
                if c.is_ascii() && (self.allowed)(c) {
                    c
                } else {
                    self.replacement
                }
            })
            .collect::<String>()
            .trim_matches(self.replacement)
            .to_owned()
    }

    /// `name`이 이 규칙에서 유효한 식별자인지 검사합니다.
    ///
    /// 실패하면 사유를 반환합니다.
    pub fn validate(&self, name: &str) -> Result<(), String> {
        if name.is_empty() {
            return Err("name must not be empty".to_owned());
        }
        if name.len() > self.max_len {
            return Err(format!(
                "name is {} characters long (max {})",
                name.len(),
                self.max_len
            ));
        }
        if !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
            return Err("name must start with a letter".to_owned());
        }
        let illegal =
            |c: char| !c.is_ascii() || !(self.allowed)(c) || (self.lowercase && c.is_ascii_uppercase());
        if let Some(bad) = name.chars().find(|&c| illegal(c)) {
            return Err(format!("name contains illegal character '{bad}'"));
        }
        Ok(())
    }
}

/// [`SUFFIX_LEN`]자리 소문자 16진수 랜덤 접미사
pub fn random_suffix() -> String {
    let mut suffix = Uuid::new_v4().simple().to_string();
    suffix.truncate(SUFFIX_LEN);
    suffix
}

/// 영문자, 숫자, 밑줄
pub fn sql_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// 영문자, 숫자, 하이픈
pub fn dns_label_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-'
}
