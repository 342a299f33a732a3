use crate::schema::{parse_schema_str, Schema};
use crate::store::Store;

pub(crate) const BLOG_SCHEMA: &str = r#"
options:
  reset_counters: false
  enforce_unique: true

models:
  - name: User
    fields:
      - { name: id, kind: scalar, type: Int, isId: true, isRequired: true, default: { name: autoincrement } }
      - { name: email, kind: scalar, type: String, isUnique: true, isRequired: true }
      - { name: name, kind: scalar, type: String }
      - { name: role, kind: enum, type: Role, isRequired: true, default: MEMBER }
      - { name: friends, kind: scalar, type: Int, isRequired: true, default: 0 }
      - { name: warnings, kind: scalar, type: Int, isRequired: true, default: 0 }
      - { name: banned, kind: scalar, type: Boolean, isRequired: true, default: false }
      - { name: score, kind: scalar, type: Float }
      - { name: balance, kind: scalar, type: BigInt }
      - { name: birthday, kind: scalar, type: DateTime }
      - { name: labels, kind: scalar, type: String, isList: true }
      - { name: settings, kind: scalar, type: Json, default: "{}" }
      - { name: createdAt, kind: scalar, type: DateTime, isRequired: true, default: { name: now } }
      - { name: updatedAt, kind: scalar, type: DateTime, isRequired: true, isUpdatedAt: true }
      - { name: posts, kind: object, type: Post, isList: true, relationName: PostAuthor }
      - { name: profile, kind: object, type: Profile, relationName: UserProfile }
      - { name: followers, kind: object, type: User, isList: true, relationName: Follows }
      - { name: following, kind: object, type: User, isList: true, relationName: Follows }
      - { name: reactions, kind: object, type: Reaction, isList: true, relationName: ReactionUser }

  - name: Post
    fields:
      - { name: id, kind: scalar, type: Int, isId: true, isRequired: true, default: { name: autoincrement } }
      - { name: uuid, kind: scalar, type: String, isRequired: true, default: { name: uuid, args: [4] } }
      - { name: title, kind: scalar, type: String, isRequired: true }
      - { name: published, kind: scalar, type: Boolean, isRequired: true, default: false }
      - { name: views, kind: scalar, type: Int, isRequired: true, default: 0 }
      - { name: authorId, kind: scalar, type: Int }
      - name: author
        kind: object
        type: User
        relationName: PostAuthor
        relationFromFields: [authorId]
        relationToFields: [id]
        relationOnDelete: Cascade
      - { name: tags, kind: object, type: Tag, isList: true, relationName: PostTags }
      - { name: reactions, kind: object, type: Reaction, isList: true, relationName: ReactionPost }
      - { name: createdAt, kind: scalar, type: DateTime, isRequired: true, default: { name: now } }

  - name: Profile
    fields:
      - { name: id, kind: scalar, type: Int, isId: true, isRequired: true, default: { name: autoincrement } }
      - { name: bio, kind: scalar, type: String }
      - { name: userId, kind: scalar, type: Int, isUnique: true }
      - name: user
        kind: object
        type: User
        relationName: UserProfile
        relationFromFields: [userId]
        relationToFields: [id]
        relationOnDelete: SetNull

  - name: Tag
    fields:
      - { name: id, kind: scalar, type: String, isId: true, isRequired: true, default: { name: cuid } }
      - { name: name, kind: scalar, type: String, isUnique: true, isRequired: true }
      - { name: posts, kind: object, type: Post, isList: true, relationName: PostTags }

  - name: Reaction
    primaryKey: { fields: [postId, userId] }
    fields:
      - { name: postId, kind: scalar, type: Int, isRequired: true }
      - { name: userId, kind: scalar, type: Int, isRequired: true }
      - { name: kind, kind: scalar, type: String, isRequired: true }
      - name: post
        kind: object
        type: Post
        isRequired: true
        relationName: ReactionPost
        relationFromFields: [postId]
        relationToFields: [id]
        relationOnDelete: Cascade
      - name: user
        kind: object
        type: User
        isRequired: true
        relationName: ReactionUser
        relationFromFields: [userId]
        relationToFields: [id]
        relationOnDelete: Cascade
"#;

pub(crate) fn blog_schema() -> Schema {
    Schema::new(parse_schema_str(BLOG_SCHEMA).unwrap()).unwrap()
}

pub(crate) fn blog_store() -> Store {
    Store::from_schema_str(BLOG_SCHEMA).unwrap()
}
