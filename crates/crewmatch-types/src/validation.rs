//! Configuration validation utilities.
//!
//! Backend implementations describe the TOML table they accept as a
//! [`Schema`] of required and optional [`Field`]s. The schema is checked
//! before a backend is constructed, so a typo in a storage path or a negative
//! number fails at startup rather than at the first write.

use thiserror::Error;

/// A backend table that does not match its schema.
#[derive(Debug, Error)]
pub enum ValidationError {
	#[error("Missing required field: {0}")]
	MissingField(String),
	/// The value has the right type but fails a bound or custom check.
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: String, message: String },
	#[error("Field '{field}' should be {expected}, found {actual}")]
	TypeMismatch {
		field: String,
		expected: String,
		actual: String,
	},
}

impl ValidationError {
	/// Prefixes the offending field with the table it was found in.
	fn within(self, table: &str) -> Self {
		let nest = |field: String| format!("{}.{}", table, field);
		match self {
			Self::MissingField(field) => Self::MissingField(nest(field)),
			Self::InvalidValue { field, message } => Self::InvalidValue {
				field: nest(field),
				message,
			},
			Self::TypeMismatch {
				field,
				expected,
				actual,
			} => Self::TypeMismatch {
				field: nest(field),
				expected,
				actual,
			},
		}
	}
}

/// The type of a configuration field.
#[derive(Debug)]
pub enum FieldType {
	String,
	/// An integer with optional inclusive bounds.
	Integer { min: Option<i64>, max: Option<i64> },
	Boolean,
	/// An array whose elements all have the given type.
	Array(Box<FieldType>),
	/// A nested table with its own schema.
	Table(Schema),
}

impl FieldType {
	fn describe(&self) -> &'static str {
		match self {
			FieldType::String => "string",
			FieldType::Integer { .. } => "integer",
			FieldType::Boolean => "boolean",
			FieldType::Array(_) => "array",
			FieldType::Table(_) => "table",
		}
	}
}

/// Custom check run on a field value after its type matched.
pub type FieldValidator = Box<dyn Fn(&toml::Value) -> Result<(), String> + Send + Sync>;

/// A named field with a type and an optional custom check.
pub struct Field {
	pub name: String,
	pub field_type: FieldType,
	pub validator: Option<FieldValidator>,
}

impl std::fmt::Debug for Field {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Field")
			.field("name", &self.name)
			.field("field_type", &self.field_type)
			.field("validator", &self.validator.is_some())
			.finish()
	}
}

impl Field {
	pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
		Self {
			name: name.into(),
			field_type,
			validator: None,
		}
	}

	/// Adds a custom check that runs after the type check passed.
	pub fn with_validator<F>(mut self, validator: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<(), String> + Send + Sync + 'static,
	{
		self.validator = Some(Box::new(validator));
		self
	}

	fn check(&self, value: &toml::Value) -> Result<(), ValidationError> {
		check_type(&self.name, value, &self.field_type)?;
		if let Some(validator) = &self.validator {
			validator(value).map_err(|message| ValidationError::InvalidValue {
				field: self.name.clone(),
				message,
			})?;
		}
		Ok(())
	}
}

/// Required and optional fields of a TOML table.
#[derive(Debug)]
pub struct Schema {
	pub required: Vec<Field>,
	pub optional: Vec<Field>,
}

impl Schema {
	pub fn new(required: Vec<Field>, optional: Vec<Field>) -> Self {
		Self { required, optional }
	}

	/// Checks `config` against the schema.
	///
	/// Unknown keys are ignored; nested tables are validated recursively and
	/// report dotted field paths.
	pub fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let Some(table) = config.as_table() else {
			return Err(ValidationError::TypeMismatch {
				field: "root".into(),
				expected: "table".into(),
				actual: config.type_str().into(),
			});
		};

		if let Some(absent) = self.required.iter().find(|f| !table.contains_key(&f.name)) {
			return Err(ValidationError::MissingField(absent.name.clone()));
		}

		self.required
			.iter()
			.chain(&self.optional)
			.filter_map(|field| table.get(&field.name).map(|value| (field, value)))
			.try_for_each(|(field, value)| field.check(value))
	}
}

fn mismatch(field: &str, expected: &FieldType, value: &toml::Value) -> ValidationError {
	ValidationError::TypeMismatch {
		field: field.to_string(),
		expected: expected.describe().to_string(),
		actual: value.type_str().to_string(),
	}
}

fn check_type(
	field_name: &str,
	value: &toml::Value,
	expected: &FieldType,
) -> Result<(), ValidationError> {
	match expected {
		FieldType::String if value.is_str() => Ok(()),
		FieldType::Boolean if value.is_bool() => Ok(()),
		FieldType::Integer { min, max } => {
			let n = value
				.as_integer()
				.ok_or_else(|| mismatch(field_name, expected, value))?;
			let out_of_range = match (min, max) {
				(Some(lo), _) if n < *lo => Some(format!("{} is below the minimum of {}", n, lo)),
				(_, Some(hi)) if n > *hi => Some(format!("{} is above the maximum of {}", n, hi)),
				_ => None,
			};
			match out_of_range {
				Some(message) => Err(ValidationError::InvalidValue {
					field: field_name.to_string(),
					message,
				}),
				None => Ok(()),
			}
		},
		FieldType::Array(inner) => {
			let array = value
				.as_array()
				.ok_or_else(|| mismatch(field_name, expected, value))?;
			for (i, item) in array.iter().enumerate() {
				check_type(&format!("{}[{}]", field_name, i), item, inner)?;
			}
			Ok(())
		},
		FieldType::Table(schema) => schema.validate(value).map_err(|e| e.within(field_name)),
		_ => Err(mismatch(field_name, expected, value)),
	}
}

/// A configuration schema that can validate TOML values.
///
/// Every storage backend exposes one so the engine builder can reject bad
/// backend tables before constructing anything.
pub trait ConfigSchema: Send + Sync {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError>;
}

#[cfg(test)]
mod tests {
	use super::*;

	fn parse(s: &str) -> toml::Value {
		toml::from_str(s).unwrap()
	}

	#[test]
	fn test_missing_required_field() {
		let schema = Schema::new(vec![Field::new("path", FieldType::String)], vec![]);
		let err = schema.validate(&parse("other = 1")).unwrap_err();
		assert!(matches!(err, ValidationError::MissingField(f) if f == "path"));
	}

	#[test]
	fn test_integer_bounds_and_custom_validator() {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new(
					"limit",
					FieldType::Integer {
						min: Some(1),
						max: Some(10),
					},
				),
				Field::new("path", FieldType::String).with_validator(|v| {
					if v.as_str().is_some_and(|s| s.is_empty()) {
						Err("must not be empty".into())
					} else {
						Ok(())
					}
				}),
			],
		);

		assert!(schema.validate(&parse("limit = 5")).is_ok());
		assert!(schema.validate(&parse("limit = 11")).is_err());
		assert!(schema.validate(&parse("limit = \"five\"")).is_err());
		let err = schema.validate(&parse("path = \"\"")).unwrap_err();
		assert!(err.to_string().contains("must not be empty"));
	}

	#[test]
	fn test_nested_table_reports_dotted_path() {
		let inner = Schema::new(vec![Field::new("enabled", FieldType::Boolean)], vec![]);
		let schema = Schema::new(vec![Field::new("journal", FieldType::Table(inner))], vec![]);
		let err = schema
			.validate(&parse("[journal]\nenabled = 3"))
			.unwrap_err();
		assert!(err.to_string().contains("journal.enabled"));
	}
}
